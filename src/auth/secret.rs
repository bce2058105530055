//! Redacting wrappers for key material that must never reach logs or disk.

// crates.io
use secrecy::{ExposeSecret, SecretSlice, SecretString};
// self
use crate::_prelude::*;

/// Long-lived secret shared between the title and the backend.
///
/// The bytes are zeroized on drop, the type implements neither `Serialize` nor `Display`, and
/// its `Debug` output is redacted.
#[derive(Clone)]
pub struct SharedSecret(Arc<SecretSlice<u8>>);
impl SharedSecret {
	/// Wraps raw key bytes.
	pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
		Self(Arc::new(SecretSlice::from(bytes.into())))
	}

	/// Returns the key bytes. Callers must avoid logging them.
	pub fn expose(&self) -> &[u8] {
		self.0.expose_secret()
	}

	/// Returns `true` if no key material is present.
	pub fn is_empty(&self) -> bool {
		self.expose().is_empty()
	}

	/// Identity comparison on the underlying allocation.
	pub(crate) fn same_as(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}
}
impl From<&str> for SharedSecret {
	fn from(value: &str) -> Self {
		Self::new(value.as_bytes())
	}
}
impl From<String> for SharedSecret {
	fn from(value: String) -> Self {
		Self::new(value.into_bytes())
	}
}
impl Debug for SharedSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("SharedSecret").field(&"<redacted>").finish()
	}
}

/// Short-lived session token issued by the backend after login.
#[derive(Clone)]
pub struct TokenSecret(Arc<SecretString>);
impl TokenSecret {
	/// Wraps a new token string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(Arc::new(SecretString::from(value.into())))
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		self.0.expose_secret()
	}
}
impl PartialEq for TokenSecret {
	fn eq(&self, other: &Self) -> bool {
		self.expose() == other.expose()
	}
}
impl Eq for TokenSecret {}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Player password presented at login; only ever serialized into the login body.
#[derive(Clone)]
pub struct Password(Arc<SecretString>);
impl Password {
	/// Wraps a password string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(Arc::new(SecretString::from(value.into())))
	}

	/// Returns the password. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		self.0.expose_secret()
	}
}
impl Debug for Password {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("Password").field(&"<redacted>").finish()
	}
}
