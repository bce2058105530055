//! Poll-based completion queue for engine loops that cannot await.

// std
use std::{
	collections::VecDeque,
	sync::atomic::{AtomicU64, Ordering},
};
// crates.io
use tokio::sync::Notify;
// self
use crate::{_prelude::*, api::ApiResponse};

/// Handle identifying a call handed to [`crate::api::LeetClient::submit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);
impl Ticket {
	/// Returns the raw value.
	pub const fn get(self) -> u64 {
		self.0
	}
}

/// Settled outcome of a submitted call.
#[derive(Debug)]
pub struct Completion {
	/// Ticket returned by the submission.
	pub ticket: Ticket,
	/// Call outcome.
	pub result: Result<ApiResponse>,
}

/// Thread-safe FIFO of settled calls.
#[derive(Debug, Default)]
pub struct CompletionQueue {
	next: AtomicU64,
	ready: Mutex<VecDeque<Completion>>,
	notify: Notify,
}
impl CompletionQueue {
	/// Removes and returns every settled call, oldest first. Never blocks.
	pub fn poll(&self) -> Vec<Completion> {
		self.ready.lock().drain(..).collect()
	}

	/// Removes and returns the oldest settled call, if any.
	pub fn try_next(&self) -> Option<Completion> {
		self.ready.lock().pop_front()
	}

	/// Waits for the next settled call.
	pub async fn next(&self) -> Completion {
		loop {
			if let Some(completion) = self.try_next() {
				return completion;
			}

			self.notify.notified().await;
		}
	}

	/// Number of settled calls waiting to be drained.
	pub fn len(&self) -> usize {
		self.ready.lock().len()
	}

	/// Returns `true` when nothing is waiting to be drained.
	pub fn is_empty(&self) -> bool {
		self.ready.lock().is_empty()
	}

	pub(crate) fn issue(&self) -> Ticket {
		Ticket(self.next.fetch_add(1, Ordering::Relaxed))
	}

	pub(crate) fn complete(&self, ticket: Ticket, result: Result<ApiResponse>) {
		self.ready.lock().push_back(Completion { ticket, result });
		self.notify.notify_one();
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::Value;
	// self
	use super::*;
	use crate::{error::TransportError, http::RequestId};

	#[test]
	fn completions_drain_in_arrival_order() {
		let queue = CompletionQueue::default();
		let first = queue.issue();
		let second = queue.issue();

		assert_ne!(first, second);
		assert!(queue.is_empty());

		queue.complete(second, Err(TransportError::Timeout.into()));
		queue.complete(
			first,
			Ok(ApiResponse { request_id: RequestId::next(), status: 200, data: Value::Null }),
		);

		let drained = queue.poll();

		assert_eq!(drained.iter().map(|c| c.ticket).collect::<Vec<_>>(), [second, first]);
		assert!(drained[0].result.is_err());
		assert!(queue.poll().is_empty());
	}

	#[tokio::test]
	async fn next_waits_for_a_completion() {
		let queue = Arc::new(CompletionQueue::default());
		let ticket = queue.issue();
		let producer = {
			let queue = queue.clone();

			tokio::spawn(async move { queue.complete(ticket, Err(TransportError::Timeout.into())) })
		};
		let completion = queue.next().await;

		producer.await.expect("Producer should not panic.");

		assert_eq!(completion.ticket, ticket);
	}
}
