//! Nonce providers guarding signed requests against replay.

// std
use std::{
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

/// Source of per-request nonces.
///
/// Values must never repeat within the replay window the backend enforces.
pub trait NonceProvider
where
	Self: Send + Sync,
{
	/// Produces the nonce for the next outgoing request.
	fn next_nonce(&self) -> String;
}

/// Strictly increasing nonces derived from microseconds since the UNIX epoch.
///
/// An atomic high-water mark keeps values unique even when several requests are stamped in the
/// same microsecond or the wall clock steps backwards.
#[derive(Debug, Default)]
pub struct IncreasingNonce {
	last: AtomicU64,
}
impl IncreasingNonce {
	/// Returns the next raw counter value.
	pub fn next_value(&self) -> u64 {
		let now = current_time_micros();
		let mut last = self.last.load(Ordering::SeqCst);

		loop {
			let next = now.max(last.saturating_add(1));

			match self.last.compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst) {
				Ok(_) => return next,
				Err(observed) => last = observed,
			}
		}
	}
}
impl NonceProvider for IncreasingNonce {
	fn next_nonce(&self) -> String {
		self.next_value().to_string()
	}
}

/// Random 128-bit nonces rendered as lowercase hex.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomNonce;
impl NonceProvider for RandomNonce {
	fn next_nonce(&self) -> String {
		format!("{:032x}", rand::random::<u128>())
	}
}

fn current_time_micros() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|elapsed| u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX))
		.unwrap_or_default()
}
