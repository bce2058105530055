// self
use crate::{
	obs::{OpKind, OpOutcome},
	session::SessionState,
};

/// Increments `leet_client_op_total{op, outcome}`.
pub fn record_op_outcome(kind: OpKind, outcome: OpOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(
		"leet_client_op_total",
		"op" => kind.as_str(),
		"outcome" => outcome.as_str()
	)
	.increment(1);
	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome);
}

/// Records one transport attempt in the `leet_client_transport_seconds{op}` histogram.
pub(crate) fn record_transport_latency(kind: OpKind, elapsed: std::time::Duration) {
	#[cfg(feature = "metrics")]
	metrics::histogram!("leet_client_transport_seconds", "op" => kind.as_str())
		.record(elapsed.as_secs_f64());
	#[cfg(not(feature = "metrics"))]
	let _ = (kind, elapsed);
}

/// Publishes the number of calls parked behind a transition.
pub(crate) fn record_pending_calls(depth: usize) {
	#[cfg(feature = "metrics")]
	metrics::gauge!("leet_client_pending_calls").set(depth as f64);
	#[cfg(not(feature = "metrics"))]
	let _ = depth;
}

pub(crate) fn count_transition(to: SessionState) {
	#[cfg(feature = "metrics")]
	metrics::counter!("leet_client_state_changes_total", "state" => state_label(to)).increment(1);
	#[cfg(not(feature = "metrics"))]
	let _ = to;
}

#[cfg(feature = "metrics")]
fn state_label(state: SessionState) -> &'static str {
	match state {
		SessionState::Unauthenticated => "unauthenticated",
		SessionState::Authenticating => "authenticating",
		SessionState::Active => "active",
		SessionState::Refreshing => "refreshing",
		SessionState::Failed(reason) => reason.as_str(),
	}
}
