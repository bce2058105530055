//! Client-level error types shared across signing, transport, session, and API layers.
//!
//! Every variant is `Clone` so a single settled outcome can be fanned out to all calls that
//! were queued behind the same session transition.

// self
use crate::{_prelude::*, auth::IdentifierError, session::FailureReason};

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical client error exposed by public APIs.
#[derive(Clone, Debug, PartialEq, ThisError)]
pub enum Error {
	/// Network-layer failure, potentially transient.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Backend rejected or mangled the exchange.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Request could not be signed; never retried.
	#[error(transparent)]
	Signer(#[from] SignerError),
	/// Session could not be established or kept alive.
	#[error(transparent)]
	Session(#[from] SessionError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
}
impl Error {
	/// Backend-supplied message, when the failure carries one.
	pub fn backend_message(&self) -> Option<&str> {
		match self {
			Self::Auth(AuthError::Rejected { message, .. } | AuthError::Expired { message, .. }) =>
				message.as_deref(),
			Self::Session(SessionError::Failed { message, .. }) => message.as_deref(),
			_ => None,
		}
	}
}

/// Transport-level failures (DNS, TCP, TLS, HTTP framing).
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum TransportError {
	/// The attempt did not complete before its deadline.
	#[error("Request timed out before the backend responded.")]
	Timeout,
	/// The backend refused or dropped the connection.
	#[error("Connection to the backend was refused: {message}.")]
	ConnectionRefused {
		/// Transport-specific description.
		message: String,
	},
	/// The backend host name could not be resolved.
	#[error("Backend host name could not be resolved: {message}.")]
	DnsFailure {
		/// Transport-specific description.
		message: String,
	},
	/// The exchange violated HTTP expectations or the backend failed internally.
	#[error("Protocol error while talking to the backend: {message}.")]
	ProtocolError {
		/// Transport-specific description.
		message: String,
		/// HTTP status code, when a response was received.
		status: Option<u16>,
	},
}
impl TransportError {
	/// Builds a [`TransportError::ProtocolError`] without an HTTP status.
	pub fn protocol(message: impl Display) -> Self {
		Self::ProtocolError { message: message.to_string(), status: None }
	}

	/// Returns `true` when the failure is worth retrying with backoff.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Timeout | Self::ConnectionRefused { .. })
	}
}

/// Application-layer failures reported by the backend.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum AuthError {
	/// The backend rejected the credential or the request.
	#[error("Backend rejected the request ({code}).")]
	Rejected {
		/// Backend error code, or `http_<status>` when the body carried none.
		code: String,
		/// Human-readable backend message.
		message: Option<String>,
		/// HTTP status code.
		status: Option<u16>,
	},
	/// The session token is no longer accepted.
	#[error("Session token has expired ({code}).")]
	Expired {
		/// Backend error code.
		code: String,
		/// Human-readable backend message.
		message: Option<String>,
	},
	/// The backend answered with a payload that does not match the wire contract.
	#[error("Backend returned a malformed response: {reason}.")]
	MalformedResponse {
		/// Description of the violated expectation.
		reason: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
impl AuthError {
	/// Wraps a structured JSON failure into [`AuthError::MalformedResponse`].
	pub fn malformed(
		err: serde_path_to_error::Error<serde_json::Error>,
		status: Option<u16>,
	) -> Self {
		let path = err.path().to_string();
		let reason = if path == "." {
			err.into_inner().to_string()
		} else {
			format!("{path}: {}", err.into_inner())
		};

		Self::MalformedResponse { reason, status }
	}
}

/// Signing failures; these are programmer or configuration errors.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum SignerError {
	/// The signing key is empty.
	#[error("Signing secret must not be empty.")]
	InvalidSecret,
	/// The request lacks a field the canonical string requires.
	#[error("Request cannot be signed: {reason}.")]
	MalformedRequest {
		/// Missing or invalid field.
		reason: &'static str,
	},
}

/// Session lifecycle failures surfaced to callers.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum SessionError {
	/// Every retry of a login or refresh hit a transient transport failure.
	#[error("Gave up after {attempts} attempts: {last}")]
	TransportExhausted {
		/// Number of transport attempts performed.
		attempts: u32,
		/// Failure observed on the final attempt.
		last: TransportError,
	},
	/// The call was queued behind a refresh that failed.
	#[error("Session expired and could not be refreshed.")]
	SessionExpired,
	/// The session is in the failed state and will not recover without `login()`.
	#[error("Session is unavailable ({reason}).")]
	Failed {
		/// Reason recorded by the state machine.
		reason: FailureReason,
		/// Backend message captured when the session failed.
		message: Option<String>,
	},
	/// A login is already outstanding.
	#[error("A login or refresh is already in progress.")]
	LoginInProgress,
	/// The session was logged out while the call waited.
	#[error("Session was logged out before the call could be dispatched.")]
	LoggedOut,
	/// The session manager dropped the call without an outcome.
	#[error("Call was cancelled before completion.")]
	Cancelled,
	/// A login or refresh task stopped before it produced an outcome.
	#[error("Session exchange stopped before it settled.")]
	Aborted,
}

/// Configuration and validation failures raised by the client.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed: {message}.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		message: String,
	},
	/// Base URL cannot carry request paths.
	#[error("Base URL cannot be used as a request base: {url}.")]
	InvalidBaseUrl {
		/// Offending URL.
		url: String,
	},
	/// Endpoint path could not be joined onto the base URL.
	#[error("Endpoint path `{path}` is invalid.")]
	InvalidEndpoint {
		/// Offending path.
		path: String,
	},
	/// Client identifier or username failed validation.
	#[error(transparent)]
	InvalidIdentifier(#[from] IdentifierError),
	/// Shared secret is empty.
	#[error("Shared secret must not be empty.")]
	MissingSecret,
	/// A timing knob is zero or negative.
	#[error("The {field} duration must be positive.")]
	NonPositiveDuration {
		/// Offending field name.
		field: &'static str,
	},
	/// The per-attempt timeout must be shorter than the overall call timeout.
	#[error("The attempt timeout must be shorter than the call timeout.")]
	AttemptTimeoutTooLong,
	/// Refresh margin must be a fraction in `[0, 1)`.
	#[error("Refresh margin must be at least 0 and below 1, got {margin}.")]
	InvalidRefreshMargin {
		/// Offending margin.
		margin: String,
	},
	/// Configuration document could not be parsed.
	#[error("Configuration is invalid at {path}: {message}.")]
	Parse {
		/// JSON path of the failing field.
		path: String,
		/// Parser message.
		message: String,
	},
	/// No Tokio runtime was captured at build time or is reachable from the caller.
	#[error("No Tokio runtime is available to run session work.")]
	NoRuntime,
	/// Request payload could not be encoded as JSON.
	#[error("Request payload could not be encoded: {message}.")]
	Payload {
		/// Serializer message.
		message: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl Display) -> Self {
		Self::HttpClientBuild { message: src.to_string() }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}
