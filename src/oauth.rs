//! Client-credentials grant exchange built on the `oauth2` crate.
//!
//! [`GrantExchange`] turns an [`EndpointScope`] into a configured `oauth2` client, runs the
//! exchange through a [`TokenHttpClient`], and maps every failure into [`AuthError`]. OAuth
//! `error` fields win over HTTP status codes when classifying rejections.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpClientError,
	RequestTokenError, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{ClientAuthMethod, EndpointScope, ScopeName, TokenRecord},
	error::{AuthError, ConfigError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
};

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Maps HTTP transport failures into crate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport while refreshing `scope`.
	fn map_transport_error(
		&self,
		scope: &ScopeName,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		scope: &ScopeName,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(scope, meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => AuthError::network(scope.to_string(), inner).into(),
			HttpClientError::Other(message) => unavailable(scope, meta, message).into(),
			_ => unavailable(scope, meta, "unrecognized HTTP client failure").into(),
		}
	}
}

/// Configured `oauth2` client for one endpoint scope.
pub(crate) struct GrantExchange<'a, C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	scope: &'a ScopeName,
	oauth_client: ConfiguredBasicClient,
	http_client: &'a C,
	error_mapper: &'a M,
}
impl<'a, C, M> GrantExchange<'a, C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn for_scope(
		endpoint: &'a EndpointScope,
		http_client: &'a C,
		error_mapper: &'a M,
	) -> Result<Self> {
		let token_url = TokenUrl::new(endpoint.token_endpoint.to_string()).map_err(|source| {
			ConfigError::invalid_url(endpoint.token_endpoint.as_str(), source)
		})?;
		let mut oauth_client = BasicClient::new(ClientId::new(endpoint.client_id.clone()))
			.set_client_secret(ClientSecret::new(endpoint.client_secret.expose().to_owned()))
			.set_token_uri(token_url);

		if matches!(endpoint.client_auth, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self { scope: &endpoint.name, oauth_client, http_client, error_mapper })
	}

	/// Runs `grant_type=client_credentials` and builds a record stamped with the current clock.
	pub(crate) async fn exchange(&self) -> Result<TokenRecord> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let response = self
			.oauth_client
			.exchange_client_credentials()
			.request_async(&instrumented)
			.await
			.map_err(|err| self.map_request_error(meta.take(), err))?;

		record_from_response(self.scope, response, OffsetDateTime::now_utc())
	}

	fn map_request_error(
		&self,
		meta: Option<ResponseMetadata>,
		err: BasicRequestTokenError<HttpClientError<C::TransportError>>,
	) -> Error {
		let scope = self.scope;
		let meta = meta.as_ref();

		match err {
			RequestTokenError::ServerResponse(response) =>
				map_server_response(scope, &response, meta).into(),
			RequestTokenError::Request(error) =>
				self.error_mapper.map_transport_error(scope, meta, error),
			RequestTokenError::Parse(source, _body) => match meta_status(meta) {
				Some(status) if !is_success(status) =>
					classify(scope, None, None, meta, format!("HTTP {status}")).into(),
				status =>
					AuthError::MalformedResponse {
						scope: scope.to_string(),
						source: Arc::new(source),
						status,
					}
					.into(),
			},
			RequestTokenError::Other(message) => match meta_status(meta) {
				Some(status) if !is_success(status) =>
					classify(scope, None, None, meta, message).into(),
				_ => unavailable(scope, meta, message).into(),
			},
		}
	}
}

fn record_from_response(
	scope: &ScopeName,
	response: BasicTokenResponse,
	issued_at: OffsetDateTime,
) -> Result<TokenRecord> {
	let expires_in = response
		.expires_in()
		.ok_or_else(|| AuthError::MissingExpiresIn { scope: scope.to_string() })?
		.as_secs();
	let expires_in = i64::try_from(expires_in)
		.map_err(|_| AuthError::ExpiresInOutOfRange { scope: scope.to_string() })?;

	if expires_in <= 0 {
		return Err(AuthError::NonPositiveExpiresIn { scope: scope.to_string() }.into());
	}

	let ttl = Duration::seconds(expires_in);
	let expires_at = issued_at
		.checked_add(ttl)
		.ok_or_else(|| AuthError::ExpiresInOutOfRange { scope: scope.to_string() })?;

	TokenRecord::builder(scope.clone())
		.access_token(response.access_token().secret().to_owned())
		.issued_at(issued_at)
		.expires_at(expires_at)
		.build()
		.map_err(|err| ConfigError::from(err).into())
}

fn map_server_response(
	scope: &ScopeName,
	response: &BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> AuthError {
	let code = response.error().as_ref();
	let description = response.error_description().map(String::as_str);
	let reason = description.unwrap_or(code).to_owned();

	classify(scope, Some(code), description, meta, reason)
}

/// Classifies a token endpoint rejection, preferring OAuth error codes over the HTTP status.
fn classify(
	scope: &ScopeName,
	code: Option<&str>,
	description: Option<&str>,
	meta: Option<&ResponseMetadata>,
	reason: impl Into<String>,
) -> AuthError {
	let scope = scope.to_string();
	let reason = reason.into();
	let status = meta_status(meta);
	let kind = code
		.and_then(classify_code)
		.or_else(|| description.and_then(classify_code))
		.unwrap_or_else(|| classify_status(status));

	match kind {
		RejectionKind::InvalidClient => AuthError::InvalidClient { scope, reason, status },
		RejectionKind::InvalidGrant => AuthError::InvalidGrant { scope, reason, status },
		RejectionKind::AccessDenied => AuthError::AccessDenied { scope, reason, status },
		RejectionKind::Unavailable =>
			AuthError::Unavailable { scope, reason, status, retry_after: meta_retry_after(meta) },
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RejectionKind {
	InvalidClient,
	InvalidGrant,
	AccessDenied,
	Unavailable,
}

fn classify_code(value: &str) -> Option<RejectionKind> {
	let lowered = value.to_ascii_lowercase();

	match lowered.as_str() {
		"invalid_client" | "unauthorized_client" => Some(RejectionKind::InvalidClient),
		"invalid_grant" | "unsupported_grant_type" | "invalid_request" =>
			Some(RejectionKind::InvalidGrant),
		"access_denied" | "invalid_scope" | "insufficient_scope" =>
			Some(RejectionKind::AccessDenied),
		"temporarily_unavailable" | "server_error" => Some(RejectionKind::Unavailable),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> RejectionKind {
	match status {
		Some(401) => RejectionKind::InvalidClient,
		Some(403) => RejectionKind::AccessDenied,
		Some(400 | 404 | 410) => RejectionKind::InvalidGrant,
		_ => RejectionKind::Unavailable,
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(scope: &ScopeName, meta: Option<&ResponseMetadata>, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return AuthError::Unavailable {
			scope: scope.to_string(),
			reason: "request timed out".into(),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	AuthError::network(scope.to_string(), err).into()
}

fn unavailable(
	scope: &ScopeName,
	meta: Option<&ResponseMetadata>,
	reason: impl Into<String>,
) -> AuthError {
	AuthError::Unavailable {
		scope: scope.to_string(),
		reason: reason.into(),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
}

fn is_success(status: u16) -> bool {
	(200..300).contains(&status)
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn scope() -> ScopeName {
		ScopeName::new("wholesale_market").expect("Scope fixture should be valid.")
	}

	fn meta(status: u16) -> ResponseMetadata {
		ResponseMetadata { status: Some(status), retry_after: Some(Duration::seconds(5)) }
	}

	fn token_response(body: &str) -> BasicTokenResponse {
		serde_json::from_str(body).expect("Token response fixture should deserialize.")
	}

	#[test]
	fn oauth_codes_win_over_status() {
		let err = classify(&scope(), Some("invalid_client"), None, Some(&meta(400)), "nope");

		assert!(matches!(err, AuthError::InvalidClient { status: Some(400), .. }));

		let err = classify(&scope(), Some("custom"), Some("access_denied"), Some(&meta(400)), "x");

		assert!(matches!(err, AuthError::AccessDenied { .. }));
	}

	#[test]
	fn status_fallback_covers_common_codes() {
		assert!(matches!(
			classify(&scope(), None, None, Some(&meta(401)), "HTTP 401"),
			AuthError::InvalidClient { status: Some(401), .. }
		));
		assert!(matches!(
			classify(&scope(), None, None, Some(&meta(403)), "HTTP 403"),
			AuthError::AccessDenied { .. }
		));
		assert!(matches!(
			classify(&scope(), None, None, Some(&meta(400)), "HTTP 400"),
			AuthError::InvalidGrant { .. }
		));

		match classify(&scope(), None, None, Some(&meta(503)), "HTTP 503") {
			AuthError::Unavailable { status, retry_after, .. } => {
				assert_eq!(status, Some(503));
				assert_eq!(retry_after, Some(Duration::seconds(5)));
			},
			other => panic!("Unexpected classification: {other:?}."),
		}
	}

	#[test]
	fn record_expiry_is_issued_at_plus_ttl() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let response = token_response(
			r#"{"access_token":"fake_token","token_type":"Bearer","expires_in":7200}"#,
		);
		let record = record_from_response(&scope(), response, issued)
			.expect("Well-formed response should produce a record.");

		assert_eq!(record.access_token.expose(), "fake_token");
		assert_eq!(record.issued_at, issued);
		assert_eq!(record.expires_at, macros::datetime!(2025-01-01 02:00 UTC));
		assert_eq!(record.scope, scope());
	}

	#[test]
	fn missing_or_zero_ttl_is_rejected() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let missing = token_response(r#"{"access_token":"t","token_type":"Bearer"}"#);

		assert!(matches!(
			record_from_response(&scope(), missing, issued),
			Err(Error::Auth(AuthError::MissingExpiresIn { .. }))
		));

		let zero = token_response(r#"{"access_token":"t","token_type":"Bearer","expires_in":0}"#);

		assert!(matches!(
			record_from_response(&scope(), zero, issued),
			Err(Error::Auth(AuthError::NonPositiveExpiresIn { .. }))
		));
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn builds_clients_for_both_auth_methods() {
		let url = Url::parse("https://digital.iservices.rte-france.com/token/oauth/")
			.expect("Token URL fixture should parse.");
		let basic = EndpointScope::new("wholesale_market", "id", "secret", url)
			.expect("Scope fixture should be valid.");
		let post = basic.clone().with_client_auth(ClientAuthMethod::ClientSecretPost);
		let http_client = crate::http::ReqwestHttpClient::new().expect("Client should build.");
		let mapper = ReqwestTransportErrorMapper;

		assert!(GrantExchange::for_scope(&basic, &http_client, &mapper).is_ok());
		assert!(GrantExchange::for_scope(&post, &http_client, &mapper).is_ok());
	}
}
