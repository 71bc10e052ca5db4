//! Cached access token records, freshness checks, and the record builder.

// self
use crate::{
	_prelude::*,
	auth::{ScopeName, token::secret::TokenSecret},
};

/// Errors produced by [`TokenRecordBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenRecordBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
}

/// Access token issued for one endpoint scope.
#[derive(Serialize, Deserialize, Clone)]
pub struct TokenRecord {
	/// Scope the token was minted for.
	pub scope: ScopeName,
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Instant the grant exchange completed.
	pub issued_at: OffsetDateTime,
	/// `issued_at` plus the TTL returned by the token endpoint.
	pub expires_at: OffsetDateTime,
}
impl TokenRecord {
	/// Returns a builder for the provided scope.
	pub fn builder(scope: ScopeName) -> TokenRecordBuilder {
		TokenRecordBuilder::new(scope)
	}

	/// Returns `true` while `instant < expires_at - margin`.
	///
	/// A negative margin is treated as zero.
	pub fn is_fresh_at(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		let margin = if margin.is_negative() { Duration::ZERO } else { margin };

		match self.expires_at.checked_sub(margin) {
			Some(deadline) => instant < deadline,
			None => false,
		}
	}

	/// Time left before expiry at the provided instant (negative once expired).
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		self.expires_at - instant
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("scope", &self.scope)
			.field("access_token", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`TokenRecord`].
#[derive(Clone, Debug)]
pub struct TokenRecordBuilder {
	scope: ScopeName,
	access_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl TokenRecordBuilder {
	fn new(scope: ScopeName) -> Self {
		Self { scope, access_token: None, issued_at: None, expires_at: None, expires_in: None }
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Consumes the builder and produces a [`TokenRecord`].
	pub fn build(self) -> Result<TokenRecord, TokenRecordBuilderError> {
		let access_token = self.access_token.ok_or(TokenRecordBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at + delta,
			(None, None) => return Err(TokenRecordBuilderError::MissingExpiry),
		};

		Ok(TokenRecord { scope: self.scope, access_token, issued_at, expires_at })
	}
}
