//! Validated identifiers for the title and its players.
//!
//! A [`ClientId`] is embedded verbatim in the `x-leet-auth` header, so it must stay a plain
//! token. A [`Username`] only travels inside JSON bodies and may contain inner spaces.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

const CLIENT_ID_MAX_LEN: usize = 128;
const USERNAME_MAX_CHARS: usize = 64;

// Characters that would split or forge fields of the auth header.
const HEADER_DELIMITERS: &[char] = &[',', '=', '"'];

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (`Client` or `Username`).
		kind: &'static str,
	},
	/// The identifier starts or ends with whitespace.
	#[error("{kind} identifier has leading or trailing whitespace.")]
	SurroundingWhitespace {
		/// Kind of identifier (`Client` or `Username`).
		kind: &'static str,
	},
	/// The identifier contains a character its wire position cannot carry.
	#[error("{kind} identifier contains forbidden character {found:?}.")]
	ForbiddenCharacter {
		/// Kind of identifier (`Client` or `Username`).
		kind: &'static str,
		/// First offending character.
		found: char,
	},
	/// The identifier exceeded its length limit.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (`Client` or `Username`).
		kind: &'static str,
		/// Maximum permitted length.
		max: usize,
	},
}

/// Identifier the backend issued to the title (the API key).
///
/// Printable ASCII only, without whitespace or header delimiters, at most 128 bytes.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);
impl ClientId {
	const KIND: &'static str = "Client";

	/// Validates and wraps `value`.
	pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
		let value = value.as_ref();

		Self::check(value)?;

		Ok(Self(value.to_owned()))
	}

	fn check(value: &str) -> Result<(), IdentifierError> {
		let kind = Self::KIND;

		if value.is_empty() {
			return Err(IdentifierError::Empty { kind });
		}
		if let Some(found) = value
			.chars()
			.find(|c| !c.is_ascii_graphic() || HEADER_DELIMITERS.contains(c))
		{
			if found.is_whitespace() && value.trim() != value {
				return Err(IdentifierError::SurroundingWhitespace { kind });
			}

			return Err(IdentifierError::ForbiddenCharacter { kind, found });
		}
		if value.len() > CLIENT_ID_MAX_LEN {
			return Err(IdentifierError::TooLong { kind, max: CLIENT_ID_MAX_LEN });
		}

		Ok(())
	}
}

/// Player account name presented at login.
///
/// Inner spaces are allowed; control characters and surrounding whitespace are not. Limited to
/// 64 characters.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);
impl Username {
	const KIND: &'static str = "Username";

	/// Validates and wraps `value`.
	pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
		let value = value.as_ref();

		Self::check(value)?;

		Ok(Self(value.to_owned()))
	}

	fn check(value: &str) -> Result<(), IdentifierError> {
		let kind = Self::KIND;

		if value.is_empty() {
			return Err(IdentifierError::Empty { kind });
		}
		if value.trim() != value {
			return Err(IdentifierError::SurroundingWhitespace { kind });
		}
		if let Some(found) = value.chars().find(|c| c.is_control()) {
			return Err(IdentifierError::ForbiddenCharacter { kind, found });
		}
		if value.chars().count() > USERNAME_MAX_CHARS {
			return Err(IdentifierError::TooLong { kind, max: USERNAME_MAX_CHARS });
		}

		Ok(())
	}
}

// Shared string-newtype plumbing; validation stays on each type.
macro_rules! impl_string_newtype {
	($name:ident) => {
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				Self::check(&value)?;

				Ok(Self(value))
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, "{}({})", Self::KIND, self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
	};
}
impl_string_newtype!(ClientId);
impl_string_newtype!(Username);
