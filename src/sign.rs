//! Request signing: canonical strings, HMAC-SHA256 tags, and the authentication header.
//!
//! A signature is computed as
//!
//! ```text
//! base64(HMAC-SHA256(
//!     key,
//!     METHOD \n PATH \n SORTED_QUERY \n hex(SHA256(body)) \n UNIX_SECONDS \n NONCE
//! ))
//! ```
//!
//! where `SORTED_QUERY` is the query pairs sorted by key then value and serialized as
//! `application/x-www-form-urlencoded`. [`sign`] is a pure function; [`RequestSigner`] only adds
//! the nonce and timestamp stamping around it.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{ClientId, NonceProvider},
	clock::Clock,
	error::SignerError,
	http::Method,
};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the client identifier, timestamp, nonce, and digest.
pub const AUTH_HEADER: &str = "x-leet-auth";

const DELIMITER: &str = "\n";

/// Request fields covered by the signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute request path, e.g. `/v1/ping`.
	pub path: String,
	/// Query pairs in caller order; the canonical form sorts them.
	pub query: Vec<(String, String)>,
	/// Raw request body, possibly empty.
	pub body: Vec<u8>,
	/// Value used once per request.
	pub nonce: String,
	/// UTC instant the request was stamped; second resolution on the wire.
	pub timestamp: Option<OffsetDateTime>,
}
impl SignedRequest {
	/// Starts an unstamped request for `method` and `path`.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			query: Vec::new(),
			body: Vec::new(),
			nonce: String::new(),
			timestamp: None,
		}
	}

	/// Replaces the query pairs.
	pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
		self.query = query;

		self
	}

	/// Replaces the body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = body.into();

		self
	}

	/// Sets the nonce and timestamp.
	pub fn stamped(mut self, nonce: impl Into<String>, timestamp: OffsetDateTime) -> Self {
		self.nonce = nonce.into();
		self.timestamp = Some(timestamp);

		self
	}

	/// Returns the query in canonical (sorted, form-encoded) order.
	pub fn canonical_query(&self) -> String {
		let mut pairs = self.query.iter().collect::<Vec<_>>();

		pairs.sort();

		url::form_urlencoded::Serializer::new(String::new()).extend_pairs(pairs).finish()
	}
}

/// The exact bytes that were signed and the resulting authentication tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureEnvelope {
	/// Canonical string the digest was computed over.
	pub canonical_string: String,
	/// Base64-encoded HMAC-SHA256 tag.
	pub digest: String,
}

/// Builds the canonical string for `request`.
pub fn canonical_string(request: &SignedRequest) -> Result<String, SignerError> {
	let timestamp =
		request.timestamp.ok_or(SignerError::MalformedRequest { reason: "timestamp is unset" })?;

	if request.nonce.is_empty() {
		return Err(SignerError::MalformedRequest { reason: "nonce is empty" });
	}
	if !request.path.starts_with('/') {
		return Err(SignerError::MalformedRequest { reason: "path must be absolute" });
	}

	let body_digest = hex::encode(Sha256::digest(&request.body));
	let fields = [
		request.method.as_str().to_owned(),
		request.path.clone(),
		request.canonical_query(),
		body_digest,
		timestamp.unix_timestamp().to_string(),
		request.nonce.clone(),
	];

	Ok(fields.join(DELIMITER))
}

/// Signs `request` with `secret`.
///
/// Identical inputs always produce identical envelopes.
pub fn sign(secret: &[u8], request: &SignedRequest) -> Result<SignatureEnvelope, SignerError> {
	let mut mac = keyed_mac(secret)?;
	let canonical_string = canonical_string(request)?;

	mac.update(canonical_string.as_bytes());

	let digest = BASE64.encode(mac.finalize().into_bytes());

	Ok(SignatureEnvelope { canonical_string, digest })
}

/// Checks `digest` against `request` in constant time.
pub fn verify(secret: &[u8], request: &SignedRequest, digest: &str) -> bool {
	let Ok(expected) = BASE64.decode(digest) else {
		return false;
	};
	let Ok(mut mac) = keyed_mac(secret) else {
		return false;
	};
	let Ok(canonical_string) = canonical_string(request) else {
		return false;
	};

	mac.update(canonical_string.as_bytes());

	mac.verify_slice(&expected).is_ok()
}

/// Renders the [`AUTH_HEADER`] value for a signed request.
pub fn auth_header_value(
	client_id: &ClientId,
	request: &SignedRequest,
	envelope: &SignatureEnvelope,
) -> String {
	let timestamp = request.timestamp.map(|ts| ts.unix_timestamp()).unwrap_or_default();

	format!(
		"client_id={client_id},timestamp={timestamp},nonce={},signature={}",
		request.nonce, envelope.digest
	)
}

/// Stamps requests with nonces and timestamps before handing them to [`sign`].
#[derive(Clone)]
pub struct RequestSigner {
	nonces: Arc<dyn NonceProvider>,
	clock: Arc<dyn Clock>,
}
impl RequestSigner {
	/// Creates a signer drawing nonces from `nonces` and time from `clock`.
	pub fn new(nonces: Arc<dyn NonceProvider>, clock: Arc<dyn Clock>) -> Self {
		Self { nonces, clock }
	}

	/// Assigns a fresh nonce and the current timestamp, then signs with `secret`.
	pub fn stamp_and_sign(
		&self,
		secret: &[u8],
		request: SignedRequest,
	) -> Result<(SignedRequest, SignatureEnvelope), SignerError> {
		let request = request.stamped(self.nonces.next_nonce(), self.clock.now_utc());
		let envelope = sign(secret, &request)?;

		Ok((request, envelope))
	}
}
impl Debug for RequestSigner {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("RequestSigner(..)")
	}
}

fn keyed_mac(secret: &[u8]) -> Result<HmacSha256, SignerError> {
	if secret.is_empty() {
		return Err(SignerError::InvalidSecret);
	}

	HmacSha256::new_from_slice(secret).map_err(|_| SignerError::InvalidSecret)
}
