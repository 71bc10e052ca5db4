//! Request signing: attach a cached [`TokenRecord`] to an outbound request.

// crates.io
use reqwest::{
	RequestBuilder,
	header::{AUTHORIZATION, HeaderValue, InvalidHeaderValue},
};
// self
use crate::auth::TokenRecord;

/// Extension for request builders that can carry a bearer token.
pub trait RequestSignerExt
where
	Self: Sized,
{
	/// Error produced when the token cannot be encoded into the request.
	type Error;

	/// Returns the request with `Authorization: Bearer <token>` set from `record`.
	fn attach_token(self, record: &TokenRecord) -> Result<Self, Self::Error>;
}
impl RequestSignerExt for RequestBuilder {
	type Error = InvalidHeaderValue;

	fn attach_token(self, record: &TokenRecord) -> Result<Self, Self::Error> {
		let mut value = HeaderValue::from_str(&record.access_token.bearer())?;

		value.set_sensitive(true);

		Ok(self.header(AUTHORIZATION, value))
	}
}
