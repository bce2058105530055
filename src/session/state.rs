//! Session lifecycle states.

// self
use crate::{
	_prelude::*,
	error::{AuthError, SessionError},
};

/// Reason recorded when the session enters [`SessionState::Failed`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureReason {
	/// Login or refresh gave up on transport failures.
	TransportExhausted,
	/// The backend rejected the credentials.
	Rejected,
	/// The backend reported the session as expired during a transition.
	Expired,
	/// The backend answered with an unusable payload.
	MalformedResponse,
	/// Local configuration prevents any exchange (bad secret, bad endpoint).
	Misconfigured,
}
impl FailureReason {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FailureReason::TransportExhausted => "transport_exhausted",
			FailureReason::Rejected => "rejected",
			FailureReason::Expired => "expired",
			FailureReason::MalformedResponse => "malformed_response",
			FailureReason::Misconfigured => "misconfigured",
		}
	}

	/// Returns `true` when retrying with the same login cannot succeed.
	///
	/// Calls made in a terminal failed state fail fast instead of re-authenticating.
	pub const fn is_terminal(self) -> bool {
		matches!(self, FailureReason::Rejected | FailureReason::Misconfigured)
	}

	/// Maps a transition error onto the reason the session records.
	pub fn of(err: &Error) -> Self {
		match err {
			Error::Transport(_) | Error::Session(SessionError::TransportExhausted { .. }) =>
				FailureReason::TransportExhausted,
			Error::Auth(AuthError::Rejected { .. }) => FailureReason::Rejected,
			Error::Auth(AuthError::Expired { .. }) | Error::Session(SessionError::SessionExpired) =>
				FailureReason::Expired,
			Error::Auth(AuthError::MalformedResponse { .. }) => FailureReason::MalformedResponse,
			Error::Signer(_) | Error::Config(_) | Error::Session(_) => FailureReason::Misconfigured,
		}
	}
}
impl Display for FailureReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Session lifecycle owned by the session manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
	/// No session and no exchange in flight.
	Unauthenticated,
	/// A login exchange is in flight.
	Authenticating,
	/// A session token is available.
	Active,
	/// A refresh exchange is in flight.
	Refreshing,
	/// The last transition failed.
	Failed(FailureReason),
}
impl SessionState {
	/// Returns `true` while a login or refresh is in flight.
	pub const fn is_transitioning(self) -> bool {
		matches!(self, SessionState::Authenticating | SessionState::Refreshing)
	}
}
impl Display for SessionState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			SessionState::Unauthenticated => f.write_str("unauthenticated"),
			SessionState::Authenticating => f.write_str("authenticating"),
			SessionState::Active => f.write_str("active"),
			SessionState::Refreshing => f.write_str("refreshing"),
			SessionState::Failed(reason) => write!(f, "failed({reason})"),
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::{SignerError, TransportError};

	#[test]
	fn errors_map_to_failure_reasons() {
		let exhausted = Error::from(SessionError::TransportExhausted {
			attempts: 4,
			last: TransportError::Timeout,
		});
		let rejected = Error::from(AuthError::Rejected {
			code: "invalid_credentials".into(),
			message: None,
			status: Some(401),
		});

		assert_eq!(FailureReason::of(&exhausted), FailureReason::TransportExhausted);
		assert_eq!(FailureReason::of(&rejected), FailureReason::Rejected);
		assert_eq!(
			FailureReason::of(&Error::from(SignerError::InvalidSecret)),
			FailureReason::Misconfigured
		);
		assert!(FailureReason::Rejected.is_terminal());
		assert!(!FailureReason::TransportExhausted.is_terminal());
	}

	#[test]
	fn states_render_stable_labels() {
		assert_eq!(SessionState::Failed(FailureReason::Expired).to_string(), "failed(expired)");
		assert!(SessionState::Refreshing.is_transitioning());
		assert!(!SessionState::Active.is_transitioning());
	}
}
