//! Validated scope names keying registrations, guards, and cached tokens.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

const SCOPE_NAME_MAX_LEN: usize = 128;

/// Error returned when a scope name fails validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum ScopeNameError {
	/// The name was empty.
	#[error("Scope name cannot be empty.")]
	Empty,
	/// The name contains whitespace characters.
	#[error("Scope name contains whitespace.")]
	ContainsWhitespace,
	/// The name exceeded the allowed length in bytes.
	#[error("Scope name exceeds {max} bytes.")]
	TooLong {
		/// Maximum permitted length.
		max: usize,
	},
}

/// Name of one RTE API family with its own credentials and token cache.
///
/// Names are non-empty, contain no whitespace, and are at most 128 bytes long. Maps keyed by
/// `ScopeName` can be queried with a plain `&str`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScopeName(String);
impl ScopeName {
	/// Validates `value` and wraps it.
	pub fn new(value: impl AsRef<str>) -> Result<Self, ScopeNameError> {
		let value = value.as_ref();

		validate(value)?;

		Ok(Self(value.to_owned()))
	}
}
impl Deref for ScopeName {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for ScopeName {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Borrow<str> for ScopeName {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl From<ScopeName> for String {
	fn from(value: ScopeName) -> Self {
		value.0
	}
}
impl TryFrom<String> for ScopeName {
	type Error = ScopeNameError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		validate(&value)?;

		Ok(Self(value))
	}
}
impl FromStr for ScopeName {
	type Err = ScopeNameError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}
impl Debug for ScopeName {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Scope({})", self.0)
	}
}
impl Display for ScopeName {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

fn validate(value: &str) -> Result<(), ScopeNameError> {
	if value.is_empty() {
		return Err(ScopeNameError::Empty);
	}
	if value.chars().any(char::is_whitespace) {
		return Err(ScopeNameError::ContainsWhitespace);
	}
	if value.len() > SCOPE_NAME_MAX_LEN {
		return Err(ScopeNameError::TooLong { max: SCOPE_NAME_MAX_LEN });
	}

	Ok(())
}
