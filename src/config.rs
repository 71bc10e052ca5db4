//! Client configuration: endpoints, timeouts, safety margin, and per-family credentials.
//!
//! [`ClientConfig`] deserializes with defaults for every field and can be loaded from the
//! process environment:
//!
//! | Variable | Field |
//! | --- | --- |
//! | `RTE_BASE_URL` | `base_url` |
//! | `RTE_TOKEN_URL` | `token_url` |
//! | `RTE_SAFETY_MARGIN_SECS` | `safety_margin_secs` |
//! | `RTE_TIMEOUT_SECS` | `timeout_secs` |
//! | `RTE_CONNECT_TIMEOUT_SECS` | `connect_timeout_secs` |
//! | `RTE_<FAMILY>_CLIENT_ID` / `RTE_<FAMILY>_CLIENT_SECRET` | `credentials[<family>]` |
//!
//! `<FAMILY>` is the upper snake case name of an [`ApiService`], e.g. `WHOLESALE_MARKET`.

// self
use crate::{
	_prelude::*,
	auth::{ApiService, EndpointScope, TokenSecret},
	error::ConfigError,
};

/// Public RTE data API root.
pub const DEFAULT_BASE_URL: &str = "https://digital.iservices.rte-france.com/";
/// Shared RTE OAuth 2.0 token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://digital.iservices.rte-france.com/token/oauth/";
/// Default margin before expiry at which cached tokens stop being served.
pub const DEFAULT_SAFETY_MARGIN_SECS: u64 = 60;
/// Default total request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 20;

const ENV_PREFIX: &str = "RTE_";

/// Client id/secret pair for one API family.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCredentials {
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	/// OAuth 2.0 client secret; redacted from `Debug`.
	pub client_secret: TokenSecret,
}
impl ServiceCredentials {
	/// Builds a credential pair.
	pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
		Self { client_id: client_id.into(), client_secret: TokenSecret::new(client_secret) }
	}
}

/// Settings shared by the token manager and the data client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
	/// Root URL that data request paths are joined onto.
	pub base_url: String,
	/// Token endpoint used by every configured family.
	pub token_url: String,
	/// Seconds before expiry at which cached tokens are refreshed.
	pub safety_margin_secs: u64,
	/// Total timeout applied to each HTTP request, in seconds.
	pub timeout_secs: u64,
	/// Connect timeout applied to each HTTP request, in seconds.
	pub connect_timeout_secs: u64,
	/// Credentials keyed by scope name (`wholesale_market`, `short_term_consumption`, ...).
	pub credentials: BTreeMap<String, ServiceCredentials>,
}
impl ClientConfig {
	/// Loads overrides and credentials from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Loads overrides and credentials through `lookup`, which maps a variable name to its
	/// value. Empty values count as unset.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
		let mut config = Self::default();

		if let Some(url) = var("RTE_BASE_URL") {
			config.base_url = url;
		}
		if let Some(url) = var("RTE_TOKEN_URL") {
			config.token_url = url;
		}
		if let Some(secs) = parse_secs("RTE_SAFETY_MARGIN_SECS", var("RTE_SAFETY_MARGIN_SECS"))? {
			config.safety_margin_secs = secs;
		}
		if let Some(secs) = parse_secs("RTE_TIMEOUT_SECS", var("RTE_TIMEOUT_SECS"))? {
			config.timeout_secs = secs;
		}
		if let Some(secs) =
			parse_secs("RTE_CONNECT_TIMEOUT_SECS", var("RTE_CONNECT_TIMEOUT_SECS"))?
		{
			config.connect_timeout_secs = secs;
		}

		for service in ApiService::ALL {
			let id_var = format!("{ENV_PREFIX}{}_CLIENT_ID", service.env_key());
			let secret_var = format!("{ENV_PREFIX}{}_CLIENT_SECRET", service.env_key());
			let credentials = match (var(&id_var), var(&secret_var)) {
				(Some(id), Some(secret)) => ServiceCredentials::new(id, secret),
				(None, None) => continue,
				(Some(_), None) => return Err(incomplete(service, secret_var)),
				(None, Some(_)) => return Err(incomplete(service, id_var)),
			};

			config.credentials.insert(service.as_str().to_owned(), credentials);
		}

		Ok(config)
	}

	/// Adds (or replaces) the credentials of one API family.
	pub fn with_credentials(
		mut self,
		service: impl AsRef<str>,
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
	) -> Self {
		self.credentials
			.insert(service.as_ref().to_owned(), ServiceCredentials::new(client_id, client_secret));

		self
	}

	/// Parsed base URL, always ending with `/` so relative paths join underneath it.
	pub fn base_url(&self) -> Result<Url, ConfigError> {
		let raw = if self.base_url.ends_with('/') {
			self.base_url.clone()
		} else {
			format!("{}/", self.base_url)
		};

		Url::parse(&raw).map_err(|source| ConfigError::invalid_url(&self.base_url, source))
	}

	/// Parsed token endpoint URL.
	pub fn token_url(&self) -> Result<Url, ConfigError> {
		Url::parse(&self.token_url).map_err(|source| ConfigError::invalid_url(&self.token_url, source))
	}

	/// Safety margin as a signed duration.
	pub fn safety_margin(&self) -> Duration {
		Duration::seconds(i64::try_from(self.safety_margin_secs).unwrap_or(i64::MAX))
	}

	/// Total request timeout.
	pub fn timeout(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.timeout_secs)
	}

	/// Connect timeout.
	pub fn connect_timeout(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.connect_timeout_secs)
	}

	/// Builds one endpoint scope per configured family, all pointing at [`Self::token_url`].
	pub fn endpoint_scopes(&self) -> Result<Vec<EndpointScope>, ConfigError> {
		let token_url = self.token_url()?;

		self.credentials
			.iter()
			.map(|(name, credentials)| {
				EndpointScope::new(
					name,
					credentials.client_id.as_str(),
					credentials.client_secret.expose(),
					token_url.clone(),
				)
				.map_err(ConfigError::from)
			})
			.collect()
	}
}
impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			base_url: DEFAULT_BASE_URL.into(),
			token_url: DEFAULT_TOKEN_URL.into(),
			safety_margin_secs: DEFAULT_SAFETY_MARGIN_SECS,
			timeout_secs: DEFAULT_TIMEOUT_SECS,
			connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
			credentials: BTreeMap::new(),
		}
	}
}

fn parse_secs(name: &str, value: Option<String>) -> Result<Option<u64>, ConfigError> {
	value
		.map(|raw| {
			raw.trim()
				.parse::<u64>()
				.map_err(|_| ConfigError::InvalidEnv { name: name.to_owned(), value: raw.clone() })
		})
		.transpose()
}

fn incomplete(service: ApiService, missing: String) -> ConfigError {
	ConfigError::IncompleteCredentials { service: service.as_str().to_owned(), missing }
}
