//! Crate-level error types shared by the token manager, stores, and the data client.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem (unknown scope, invalid definition, bad environment).
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Token acquisition failed.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// A data endpoint answered with a failure or an undecodable body.
	#[error(transparent)]
	Api(#[from] ApiError),
	/// A data request never produced a response (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// No endpoint scope is registered under the requested name.
	#[error("No endpoint scope is registered under `{scope}`.")]
	UnknownScope {
		/// Requested scope name.
		scope: String,
	},
	/// Endpoint scope definition failed validation.
	#[error(transparent)]
	InvalidScope(#[from] crate::auth::EndpointScopeError),
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A configured or derived URL cannot be parsed.
	#[error("URL `{url}` is invalid.")]
	InvalidUrl {
		/// Offending input.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Only one half of a client id/secret pair was supplied.
	#[error("Credentials for `{service}` are incomplete: `{missing}` is not set.")]
	IncompleteCredentials {
		/// Endpoint family whose credentials are incomplete.
		service: String,
		/// Name of the missing variable or field.
		missing: String,
	},
	/// An environment variable holds an unparsable value.
	#[error("Environment variable `{name}` holds an invalid value `{value}`.")]
	InvalidEnv {
		/// Variable name.
		name: String,
		/// Raw value.
		value: String,
	},
	/// Token record builder validation failed.
	#[error("Unable to build token record.")]
	TokenBuild(#[from] crate::auth::TokenRecordBuilderError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	/// Wraps a URL parsing failure together with the offending input.
	pub fn invalid_url(url: impl Into<String>, source: url::ParseError) -> Self {
		Self::InvalidUrl { url: url.into(), source }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Token acquisition failures raised by the client-credentials grant exchange.
///
/// None of these are retried by the crate; `Unavailable` carries the upstream hint when the
/// caller wants to retry on its own. Values are cheap to clone so one failed exchange can be
/// handed to every caller that waited on it.
#[derive(Clone, Debug, ThisError)]
pub enum AuthError {
	/// Token endpoint rejected the client credentials.
	#[error("Client authentication failed for scope `{scope}`: {reason}.")]
	InvalidClient {
		/// Scope whose credentials were rejected.
		scope: String,
		/// Provider- or crate-supplied reason string.
		reason: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint rejected the grant itself.
	#[error("Token endpoint rejected the grant for scope `{scope}`: {reason}.")]
	InvalidGrant {
		/// Scope whose grant was rejected.
		scope: String,
		/// Provider- or crate-supplied reason string.
		reason: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Client is not allowed to access the requested API family.
	#[error("Token endpoint denied access for scope `{scope}`: {reason}.")]
	AccessDenied {
		/// Scope that was denied.
		scope: String,
		/// Provider- or crate-supplied reason string.
		reason: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint reported a temporary failure.
	#[error("Token endpoint for scope `{scope}` is unavailable: {reason}.")]
	Unavailable {
		/// Scope being refreshed.
		scope: String,
		/// Provider- or crate-supplied reason string.
		reason: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with JSON that does not match the token response shape.
	#[error("Token endpoint for scope `{scope}` returned a malformed payload.")]
	MalformedResponse {
		/// Scope being refreshed.
		scope: String,
		/// Structured parsing failure.
		#[source]
		source: Arc<serde_path_to_error::Error<serde_json::error::Error>>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response for scope `{scope}` is missing expires_in.")]
	MissingExpiresIn {
		/// Scope being refreshed.
		scope: String,
	},
	/// Token endpoint returned a non-positive `expires_in`.
	#[error("Token endpoint response for scope `{scope}` has a non-positive expires_in.")]
	NonPositiveExpiresIn {
		/// Scope being refreshed.
		scope: String,
	},
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("Token endpoint response for scope `{scope}` has an expires_in out of range.")]
	ExpiresInOutOfRange {
		/// Scope being refreshed.
		scope: String,
	},
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint for scope `{scope}`.")]
	Network {
		/// Scope being refreshed.
		scope: String,
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
}
impl AuthError {
	/// Wraps a transport-specific network error.
	pub fn network(
		scope: impl Into<String>,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { scope: scope.into(), source: Arc::new(src) }
	}

	/// Returns the scope whose token acquisition failed.
	pub fn scope(&self) -> &str {
		match self {
			Self::InvalidClient { scope, .. }
			| Self::InvalidGrant { scope, .. }
			| Self::AccessDenied { scope, .. }
			| Self::Unavailable { scope, .. }
			| Self::MalformedResponse { scope, .. }
			| Self::MissingExpiresIn { scope }
			| Self::NonPositiveExpiresIn { scope }
			| Self::ExpiresInOutOfRange { scope }
			| Self::Network { scope, .. } => scope,
		}
	}

	/// Returns the HTTP status reported by the token endpoint, when one was observed.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::InvalidClient { status, .. }
			| Self::InvalidGrant { status, .. }
			| Self::AccessDenied { status, .. }
			| Self::Unavailable { status, .. }
			| Self::MalformedResponse { status, .. } => *status,
			_ => None,
		}
	}
}

/// Data endpoint failures.
#[derive(Debug, ThisError)]
pub enum ApiError {
	/// Data endpoint answered with a non-success status.
	#[error("Request failed with status code {status}: {description} (error: {code}).")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Upstream `error` field.
		code: String,
		/// Upstream `error_description` field.
		description: String,
	},
	/// Response body could not be decoded into the requested type.
	#[error("Response body could not be decoded.")]
	Decode {
		/// Structured parsing failure, including the JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
	},
}

/// Transport-level failures of data requests.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling a data endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
