//! Transport primitives for signed backend calls.
//!
//! The module exposes [`Transport`] alongside the crate-owned [`HttpRequest`] and
//! [`HttpResponse`] types so titles can route traffic through their engine's own networking
//! stack without depending on reqwest. The session manager wraps every
//! [`Transport::execute`] future in its own deadline, so implementations may ignore
//! [`HttpRequest::timeout`], although honoring it lets the connection be torn down sooner.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{_prelude::*, error::TransportError};

/// Boxed future returned by [`Transport::execute`]; owns everything it needs.
pub type TransportFuture =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send + 'static>>;

/// Abstraction over HTTP stacks capable of executing signed requests.
///
/// The trait is the client's only dependency on an HTTP stack. Implementations must be
/// `Send + Sync + 'static` so a single instance can be shared by every call-site, and the
/// futures they return must be `Send + 'static` so they can run on spawned tasks. Returning
/// from `execute` must not block: all network work happens when the future is polled.
///
/// Signed calls reach `execute` in the order they were submitted and signed. A stack that must
/// put requests on the wire in nonce order should claim its slot there.
pub trait Transport
where
	Self: 'static + Send + Sync,
{
	/// Issues `request` and resolves once a response (of any status) or a failure is known.
	fn execute(&self, request: HttpRequest) -> TransportFuture;
}

/// HTTP methods the backend accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `PATCH`
	Patch,
	/// `DELETE`
	Delete,
}
impl Method {
	/// Returns the uppercase wire name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Process-unique identifier correlating a request with its outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);
impl RequestId {
	/// Allocates the next identifier.
	pub fn next() -> Self {
		static COUNTER: AtomicU64 = AtomicU64::new(1);

		Self(COUNTER.fetch_add(1, Ordering::Relaxed))
	}

	/// Returns the raw value.
	pub const fn get(self) -> u64 {
		self.0
	}
}
impl Display for RequestId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "req-{}", self.0)
	}
}

/// Fully signed request ready for the wire.
#[derive(Clone, Debug)]
pub struct HttpRequest {
	/// Correlation identifier.
	pub id: RequestId,
	/// HTTP method.
	pub method: Method,
	/// Absolute URL including the canonical query.
	pub url: Url,
	/// Header pairs; names are lowercase.
	pub headers: Vec<(String, String)>,
	/// Raw body.
	pub body: Vec<u8>,
	/// Per-attempt deadline.
	pub timeout: std::time::Duration,
}
impl HttpRequest {
	/// Returns the first header value named `name` (case-insensitive).
	pub fn header(&self, name: &str) -> Option<&str> {
		find_header(&self.headers, name)
	}
}

/// Response returned by a [`Transport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
	/// HTTP status code.
	pub status: u16,
	/// Header pairs.
	pub headers: Vec<(String, String)>,
	/// Raw body.
	pub body: Vec<u8>,
}
impl HttpResponse {
	/// Returns the first header value named `name` (case-insensitive).
	pub fn header(&self, name: &str) -> Option<&str> {
		find_header(&self.headers, name)
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
	headers
		.iter()
		.find(|(key, _)| key.eq_ignore_ascii_case(name))
		.map(|(_, value)| value.as_str())
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Signed calls should not follow redirects, because the signature covers the requested path;
/// [`ReqwestTransport::new`] disables them.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a transport with redirects disabled.
	pub fn new() -> Result<Self, crate::error::ConfigError> {
		let client = ReqwestClient::builder().redirect(reqwest::redirect::Policy::none()).build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Transport for ReqwestTransport {
	fn execute(&self, request: HttpRequest) -> TransportFuture {
		let client = self.0.clone();

		Box::pin(async move {
			let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
				.map_err(TransportError::protocol)?;
			let mut builder =
				client.request(method, request.url).timeout(request.timeout).body(request.body);

			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}

			let response = builder.send().await.map_err(map_reqwest_error)?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
				})
				.collect();
			let body = response.bytes().await.map_err(map_reqwest_error)?.to_vec();

			Ok(HttpResponse { status, headers, body })
		})
	}
}

/// Maps reqwest failures onto the transport taxonomy.
#[cfg(feature = "reqwest")]
pub fn map_reqwest_error(err: ReqwestError) -> TransportError {
	if err.is_timeout() {
		return TransportError::Timeout;
	}
	if err.is_connect() {
		let message = error_chain(&err);

		if message.contains("dns") || message.contains("resolve") {
			return TransportError::DnsFailure { message };
		}

		return TransportError::ConnectionRefused { message };
	}

	TransportError::ProtocolError {
		message: error_chain(&err),
		status: err.status().map(|code| code.as_u16()),
	}
}

#[cfg(feature = "reqwest")]
fn error_chain(err: &dyn StdError) -> String {
	let mut message = err.to_string();
	let mut source = err.source();

	while let Some(inner) = source {
		message.push_str(": ");
		message.push_str(&inner.to_string());

		source = inner.source();
	}

	message.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn request_ids_are_unique_and_increasing() {
		let first = RequestId::next();
		let second = RequestId::next();

		assert!(second > first);
		assert_eq!(format!("{first}"), format!("req-{}", first.get()));
	}

	#[test]
	fn header_lookup_is_case_insensitive() {
		let response = HttpResponse {
			status: 204,
			headers: vec![("Content-Type".into(), "application/json".into())],
			body: Vec::new(),
		};

		assert_eq!(response.header("content-type"), Some("application/json"));
		assert!(response.header("x-missing").is_none());
		assert!(response.is_success());
	}

	#[test]
	fn methods_render_uppercase() {
		assert_eq!(Method::Patch.to_string(), "PATCH");
		assert_eq!(
			serde_json::to_string(&Method::Delete).expect("Method should serialize."),
			"\"DELETE\""
		);
	}

	#[cfg(feature = "reqwest")]
	#[tokio::test]
	async fn refused_connections_map_to_connection_refused() {
		let transport = ReqwestTransport::new().expect("Transport should build.");
		let request = HttpRequest {
			id: RequestId::next(),
			method: Method::Get,
			url: Url::parse("http://127.0.0.1:9/v1/ping").expect("Loopback URL should parse."),
			headers: Vec::new(),
			body: Vec::new(),
			timeout: std::time::Duration::from_secs(2),
		};
		let err = transport.execute(request).await.expect_err("Port 9 should refuse connections.");

		assert!(
			matches!(err, TransportError::ConnectionRefused { .. } | TransportError::Timeout),
			"Unexpected error: {err:?}."
		);
	}
}
