//! Endpoint scope definitions: one credential set and token endpoint per RTE API family.

// self
use crate::{
	_prelude::*,
	auth::{ScopeName, ScopeNameError, TokenSecret},
};

/// Errors emitted when validating an [`EndpointScope`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum EndpointScopeError {
	/// Scope name failed validation.
	#[error("Scope name is invalid.")]
	InvalidName(#[from] ScopeNameError),
	/// Client identifier was empty.
	#[error("Client identifier for scope `{scope}` cannot be empty.")]
	EmptyClientId {
		/// Scope being defined.
		scope: String,
	},
	/// Token endpoint does not use HTTP(S).
	#[error("Token endpoint for scope `{scope}` must use http or https: {url}.")]
	UnsupportedScheme {
		/// Scope being defined.
		scope: String,
		/// Rejected endpoint URL.
		url: String,
	},
}

/// How the client id/secret pair is presented to the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret` (what RTE expects).
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
}

/// One RTE API family: its name, token endpoint, and client credentials.
///
/// The secret is redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointScope {
	/// Scope name used as the cache key.
	pub name: ScopeName,
	/// Token endpoint receiving the client-credentials grant.
	pub token_endpoint: Url,
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	/// OAuth 2.0 client secret.
	pub client_secret: TokenSecret,
	/// Client authentication mode for the token endpoint.
	#[serde(default)]
	pub client_auth: ClientAuthMethod,
}
impl EndpointScope {
	/// Validates and builds a scope definition using HTTP Basic client authentication.
	pub fn new(
		name: impl AsRef<str>,
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
		token_endpoint: Url,
	) -> Result<Self, EndpointScopeError> {
		let scope = Self {
			name: ScopeName::new(name)?,
			token_endpoint,
			client_id: client_id.into(),
			client_secret: TokenSecret::new(client_secret),
			client_auth: ClientAuthMethod::default(),
		};

		scope.validate()?;

		Ok(scope)
	}

	/// Overrides the client authentication mode.
	pub fn with_client_auth(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth = method;

		self
	}

	/// Checks the invariants of a definition (useful after deserializing one).
	pub fn validate(&self) -> Result<(), EndpointScopeError> {
		if self.client_id.is_empty() {
			return Err(EndpointScopeError::EmptyClientId { scope: self.name.to_string() });
		}
		if !matches!(self.token_endpoint.scheme(), "http" | "https") {
			return Err(EndpointScopeError::UnsupportedScheme {
				scope: self.name.to_string(),
				url: self.token_endpoint.to_string(),
			});
		}

		Ok(())
	}
}
impl Debug for EndpointScope {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EndpointScope")
			.field("name", &self.name)
			.field("token_endpoint", &self.token_endpoint.as_str())
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.field("client_auth", &self.client_auth)
			.finish()
	}
}

/// RTE API families known to the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiService {
	/// Wholesale market data (`wholesale_market`).
	WholesaleMarket,
	/// Short-term consumption forecasts and realised load (`short_term_consumption`).
	ShortTermConsumption,
}
impl ApiService {
	/// Every known family, in declaration order.
	pub const ALL: [Self; 2] = [Self::WholesaleMarket, Self::ShortTermConsumption];

	/// Returns the scope name registered for this family.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::WholesaleMarket => "wholesale_market",
			Self::ShortTermConsumption => "short_term_consumption",
		}
	}

	/// Returns the upper-case infix used by environment variables.
	pub const fn env_key(self) -> &'static str {
		match self {
			Self::WholesaleMarket => "WHOLESALE_MARKET",
			Self::ShortTermConsumption => "SHORT_TERM_CONSUMPTION",
		}
	}
}
impl AsRef<str> for ApiService {
	fn as_ref(&self) -> &str {
		self.as_str()
	}
}
impl Display for ApiService {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for ApiService {
	type Err = UnknownService;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|service| service.as_str() == s)
			.ok_or_else(|| UnknownService(s.to_owned()))
	}
}

/// Error returned when parsing an unknown API family name.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Unknown RTE API family `{0}`.")]
pub struct UnknownService(pub String);
