//! Backend endpoint descriptors.

// self
use crate::{_prelude::*, http::Method};

/// Method, path, and query of a backend operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
	/// HTTP method.
	pub method: Method,
	/// Absolute path joined onto the configured base URL.
	pub path: String,
	/// Query pairs; signing sorts them.
	pub query: Vec<(String, String)>,
}
impl Endpoint {
	/// Creates an endpoint without query pairs.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self { method, path: path.into(), query: Vec::new() }
	}

	/// Shorthand for a `GET` endpoint.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::Get, path)
	}

	/// Shorthand for a `POST` endpoint.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::Post, path)
	}

	/// Appends a query pair.
	pub fn query(mut self, key: impl Into<String>, value: impl Display) -> Self {
		self.query.push((key.into(), value.to_string()));

		self
	}
}
impl Display for Endpoint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{} {}", self.method, self.path)
	}
}
