//! Response envelope validation and backend error classification.
//!
//! Every backend answer is expected to be
//! `{ "status": "ok" | "error", "data": <json>, "error": { "code": str, "message": str } }`.
//! The envelope is validated into [`Envelope`] before any payload reaches the caller, so shape
//! violations surface as [`AuthError::MalformedResponse`].

// crates.io
use serde::de::DeserializeOwned;
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	error::{AuthError, TransportError},
	http::{HttpResponse, RequestId},
};

const EXPIRED_CODES: &[&str] = &["session_expired", "token_expired"];

/// Validated backend envelope.
#[derive(Clone, Debug, PartialEq)]
pub enum Envelope {
	/// Successful answer carrying its payload (`null` when absent).
	Ok(Value),
	/// Backend-reported failure.
	Error {
		/// Backend error code.
		code: String,
		/// Human-readable message.
		message: Option<String>,
	},
}
impl Envelope {
	/// Validates `response` and classifies failures.
	///
	/// 5xx statuses become [`TransportError::ProtocolError`]. Error envelopes and 4xx statuses
	/// become [`AuthError::Expired`] for the session-expiry codes and [`AuthError::Rejected`]
	/// otherwise. A 4xx whose body is not an envelope is rejected with the `http_<status>` code.
	pub fn from_response(response: &HttpResponse) -> Result<Value> {
		let status = response.status;

		if status >= 500 {
			return Err(TransportError::ProtocolError {
				message: format!("backend answered with HTTP {status}"),
				status: Some(status),
			}
			.into());
		}

		let client_error = (400..500).contains(&status);
		let envelope = match Self::parse(&response.body, status) {
			Ok(envelope) => envelope,
			Err(_) if client_error => Self::Error { code: format!("http_{status}"), message: None },
			Err(e) => return Err(e.into()),
		};

		match envelope {
			Self::Ok(_) if client_error => Err(AuthError::MalformedResponse {
				reason: "success envelope carried a client error status".into(),
				status: Some(status),
			}
			.into()),
			Self::Ok(data) => Ok(data),
			Self::Error { code, message } => Err(classify(code, message, status).into()),
		}
	}

	/// Parses and validates the raw body.
	pub fn parse(body: &[u8], status: u16) -> Result<Self, AuthError> {
		let mut de = serde_json::Deserializer::from_slice(body);
		let raw: RawEnvelope = serde_path_to_error::deserialize(&mut de)
			.map_err(|err| AuthError::malformed(err, Some(status)))?;

		match (raw.status.as_str(), raw.error) {
			("ok", None) => Ok(Self::Ok(raw.data.unwrap_or(Value::Null))),
			("ok", Some(_)) => Err(AuthError::MalformedResponse {
				reason: "success envelope carried an error object".into(),
				status: Some(status),
			}),
			("error", Some(error)) => Ok(Self::Error { code: error.code, message: error.message }),
			("error", None) => Err(AuthError::MalformedResponse {
				reason: "error envelope is missing its error object".into(),
				status: Some(status),
			}),
			(other, _) => Err(AuthError::MalformedResponse {
				reason: format!("unknown envelope status `{other}`"),
				status: Some(status),
			}),
		}
	}
}

/// Successful backend answer.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
	/// Identifier of the request that produced the answer.
	pub request_id: RequestId,
	/// HTTP status code.
	pub status: u16,
	/// Envelope payload.
	pub data: Value,
}
impl ApiResponse {
	/// Deserializes the payload into `T`.
	pub fn parse_data<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		decode(&self.data, self.status)
	}
}

/// Deserializes `data` into `T`, reporting the failing field path.
pub(crate) fn decode<T>(data: &Value, status: u16) -> Result<T>
where
	T: DeserializeOwned,
{
	serde_path_to_error::deserialize(data)
		.map_err(|err| AuthError::MalformedResponse {
			reason: format!("{}: {}", err.path(), err.inner()),
			status: Some(status),
		})
		.map_err(Into::into)
}

fn classify(code: String, message: Option<String>, status: u16) -> AuthError {
	if EXPIRED_CODES.contains(&code.as_str()) {
		AuthError::Expired { code, message }
	} else {
		AuthError::Rejected { code, message, status: Some(status) }
	}
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
	status: String,
	#[serde(default)]
	data: Option<Value>,
	#[serde(default)]
	error: Option<RawError>,
}

#[derive(Debug, Deserialize)]
struct RawError {
	code: String,
	#[serde(default)]
	message: Option<String>,
}
