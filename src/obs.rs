//! Optional observability helpers for the session manager.
//!
//! # Feature Flags
//!
//! - `tracing` wraps exchanges in `leet_client.transition` spans and dispatched requests in
//!   `leet_client.request` spans, and emits events for state changes, retries, and discarded
//!   outcomes.
//! - `metrics` publishes `leet_client_op_total{op, outcome}`,
//!   `leet_client_transport_seconds{op}`, `leet_client_pending_calls`, and
//!   `leet_client_state_changes_total{state}`.
//!
//! Without either feature every helper compiles to nothing.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::{_prelude::*, session::SessionState};

/// Reports a state change to both the tracing and metrics backends.
pub(crate) fn record_transition(from: SessionState, to: SessionState) {
	trace_transition(from, to);
	count_transition(to);
}

/// Operations observed by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// Credential-issuing login exchange.
	Login,
	/// Session renewal exchange.
	Refresh,
	/// Signed API call made with the session token.
	Call,
	/// Session teardown.
	Logout,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::Login => "login",
			OpKind::Refresh => "refresh",
			OpKind::Call => "call",
			OpKind::Logout => "logout",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// A transport attempt was issued.
	Attempt,
	/// A transient failure is being retried.
	Retry,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Retry => "retry",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
