//! Always-on session counters, readable without a metrics recorder installed.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::obs::OpOutcome;

/// Point-in-time copy of one operation's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OpTally {
	/// Operations started.
	pub attempts: u64,
	/// Transient failures retried inside an operation.
	pub retries: u64,
	/// Operations that succeeded.
	pub successes: u64,
	/// Operations that failed.
	pub failures: u64,
}
impl OpTally {
	/// Operations started but not yet settled.
	pub fn in_flight(&self) -> u64 {
		self.attempts.saturating_sub(self.successes + self.failures)
	}
}

/// Lock-free counters for one operation kind.
#[derive(Debug, Default)]
pub struct OpCounters {
	attempts: AtomicU64,
	retries: AtomicU64,
	successes: AtomicU64,
	failures: AtomicU64,
}
impl OpCounters {
	/// Operations started.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Operations that succeeded.
	pub fn successes(&self) -> u64 {
		self.successes.load(Ordering::Relaxed)
	}

	/// Operations that failed.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Copies every counter.
	pub fn tally(&self) -> OpTally {
		OpTally {
			attempts: self.attempts(),
			retries: self.retries.load(Ordering::Relaxed),
			successes: self.successes(),
			failures: self.failures(),
		}
	}

	pub(crate) fn record(&self, outcome: OpOutcome) {
		let counter = match outcome {
			OpOutcome::Attempt => &self.attempts,
			OpOutcome::Retry => &self.retries,
			OpOutcome::Success => &self.successes,
			OpOutcome::Failure => &self.failures,
		};

		counter.fetch_add(1, Ordering::Relaxed);
	}
}

/// Session activity shared by every clone of a client.
#[derive(Debug, Default)]
pub struct SessionMetrics {
	/// Login exchanges.
	pub logins: OpCounters,
	/// Refresh exchanges.
	pub refreshes: OpCounters,
	/// Signed API calls, including the remote logout.
	pub calls: OpCounters,
	transport_attempts: AtomicU64,
	discarded: AtomicU64,
}
impl SessionMetrics {
	/// Requests handed to the transport, retries included.
	pub fn transport_attempts(&self) -> u64 {
		self.transport_attempts.load(Ordering::Relaxed)
	}

	/// Login or refresh outcomes dropped because a logout or newer exchange superseded them.
	pub fn discarded_outcomes(&self) -> u64 {
		self.discarded.load(Ordering::Relaxed)
	}

	pub(crate) fn record_transport_attempt(&self) {
		self.transport_attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_discarded(&self) {
		self.discarded.fetch_add(1, Ordering::Relaxed);
	}
}
