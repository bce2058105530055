// self
use crate::{
	_prelude::*,
	error::TransportError,
	http::RequestId,
	obs::OpKind,
	session::SessionState,
};

/// Instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedOp<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOp<F> = F;

/// Span wrapping one session exchange or one dispatched request.
#[derive(Clone, Debug)]
pub struct OpSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OpSpan {
	/// `leet_client.transition` span for a login or refresh started under `epoch`.
	pub fn transition(kind: OpKind, epoch: u64) -> Self {
		#[cfg(feature = "tracing")]
		{
			Self { span: tracing::info_span!("leet_client.transition", op = kind.as_str(), epoch) }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, epoch);

			Self {}
		}
	}

	/// `leet_client.request` span for a single signed request.
	pub fn request(kind: OpKind, id: RequestId) -> Self {
		#[cfg(feature = "tracing")]
		{
			Self {
				span: tracing::info_span!(
					"leet_client.request",
					op = kind.as_str(),
					request_id = %id
				),
			}
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, id);

			Self {}
		}
	}

	/// Instruments `fut` without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOp<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

pub(crate) fn trace_transition(from: SessionState, to: SessionState) {
	#[cfg(feature = "tracing")]
	tracing::debug!(%from, %to, "session state changed");
	#[cfg(not(feature = "tracing"))]
	let _ = (from, to);
}

/// Emits a warning before a transient failure is retried.
pub(crate) fn trace_retry(
	kind: OpKind,
	attempt: u32,
	delay: std::time::Duration,
	err: &TransportError,
) {
	#[cfg(feature = "tracing")]
	tracing::warn!(
		op = kind.as_str(),
		attempt,
		delay_ms = delay.as_millis() as u64,
		error = %err,
		"transient failure, retrying"
	);
	#[cfg(not(feature = "tracing"))]
	let _ = (kind, attempt, delay, err);
}

/// Notes an exchange outcome dropped because the session moved on (logout or a newer login).
pub(crate) fn trace_discarded(kind: OpKind, epoch: u64, current: u64) {
	#[cfg(feature = "tracing")]
	tracing::debug!(op = kind.as_str(), epoch, current, "stale exchange outcome discarded");
	#[cfg(not(feature = "tracing"))]
	let _ = (kind, epoch, current);
}
