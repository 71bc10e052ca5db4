//! Authenticated JSON client for RTE data endpoints.
//!
//! Every request resolves the bearer token of its API family through a shared
//! [`ReqwestTokenManager`], so tokens are fetched lazily and reused across calls. Non-success
//! responses surface as [`ApiError::Status`] built from the upstream `error` and
//! `error_description` fields; a `401` also evicts the family's cached token, unless it was
//! already replaced, so the next call starts from a fresh grant.

// crates.io
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	config::ClientConfig,
	error::{ApiError, ConfigError, TransportError},
	ext::RequestSignerExt,
	http::ReqwestHttpClient,
	manager::ReqwestTokenManager,
	oauth::ReqwestTransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::MemoryStore,
};

const UNKNOWN_CODE: &str = "Unknown error code";
const UNKNOWN_DESCRIPTION: &str = "Unknown error";
const UNPARSABLE_CODE: &str = "Unknown";
const UNPARSABLE_DESCRIPTION: &str = "Failed to parse error details";

/// Error payload returned by RTE data endpoints.
#[derive(Deserialize)]
struct ErrorBody {
	error: Option<String>,
	error_description: Option<String>,
}

/// Thin client for RTE data endpoints.
#[derive(Clone, Debug)]
pub struct RteClient {
	http: ReqwestClient,
	base_url: Url,
	tokens: ReqwestTokenManager,
}
impl RteClient {
	/// Builds a client and a fresh token manager registered with every family that has
	/// credentials in `config`.
	pub async fn new(config: &ClientConfig) -> Result<Self> {
		let token_http = ReqwestHttpClient::with_timeouts(config.timeout(), config.connect_timeout())?;
		let tokens = ReqwestTokenManager::with_http_client(
			Arc::new(MemoryStore::default()),
			token_http,
			Arc::new(ReqwestTransportErrorMapper),
		)
		.with_safety_margin(config.safety_margin());

		for endpoint in config.endpoint_scopes()? {
			tokens.register(endpoint).await?;
		}

		Self::with_manager(config, tokens)
	}

	/// Builds a client that shares an existing token manager.
	///
	/// Credentials in `config` are ignored; families must already be registered on `tokens`.
	pub fn with_manager(config: &ClientConfig, tokens: ReqwestTokenManager) -> Result<Self> {
		let http = ReqwestClient::builder()
			.timeout(config.timeout())
			.connect_timeout(config.connect_timeout())
			.build()
			.map_err(ConfigError::from)?;

		Self::with_http_client(config, http, tokens)
	}

	/// Builds a client that sends data requests through a caller-provided reqwest client.
	///
	/// Timeouts in `config` are not applied to `http`; only its base URL is read.
	pub fn with_http_client(
		config: &ClientConfig,
		http: ReqwestClient,
		tokens: ReqwestTokenManager,
	) -> Result<Self> {
		Ok(Self { http, base_url: config.base_url()?, tokens })
	}

	/// Token manager used for every request.
	pub fn tokens(&self) -> &ReqwestTokenManager {
		&self.tokens
	}

	/// Root URL that request paths are joined onto.
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// Sends `GET base_url/path?query` with the family's bearer token and decodes the JSON body.
	pub async fn get_json<T, Q>(&self, service: impl AsRef<str>, path: &str, query: &Q) -> Result<T>
	where
		T: DeserializeOwned,
		Q: ?Sized + Serialize,
	{
		let request = self.http.get(self.endpoint(path)?).query(query);

		self.send(service.as_ref(), request).await
	}

	/// Sends `POST base_url/path` with a JSON body and the family's bearer token, then decodes
	/// the JSON response.
	pub async fn post_json<B, T>(&self, service: impl AsRef<str>, path: &str, body: &B) -> Result<T>
	where
		B: ?Sized + Serialize,
		T: DeserializeOwned,
	{
		let request = self.http.post(self.endpoint(path)?).json(body);

		self.send(service.as_ref(), request).await
	}

	fn endpoint(&self, path: &str) -> Result<Url> {
		let path = path.trim_start_matches('/');

		Ok(self.base_url.join(path).map_err(|source| ConfigError::invalid_url(path, source))?)
	}

	async fn send<T>(&self, scope: &str, request: RequestBuilder) -> Result<T>
	where
		T: DeserializeOwned,
	{
		const KIND: FlowKind = FlowKind::DataRequest;

		let span = FlowSpan::new(KIND, "send", scope);

		span.instrument(async {
			obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

			let result = self.send_signed(scope, request, &span).await;

			obs::record_flow_outcome(
				KIND,
				if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure },
			);

			result
		})
		.await
	}

	async fn send_signed<T>(&self, scope: &str, request: RequestBuilder, span: &FlowSpan) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let record = self.tokens.get_record(scope).await?;
		let request = request.attach_token(&record).map_err(TransportError::network)?;
		let response = request.send().await.map_err(TransportError::from)?;

		self.read_response(scope, &record.access_token, response, span).await
	}

	async fn read_response<T>(
		&self,
		scope: &str,
		token: &TokenSecret,
		response: Response,
		span: &FlowSpan,
	) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let status = response.status();
		let body = response.bytes().await.map_err(TransportError::from)?;

		if !status.is_success() {
			// A token refreshed by a concurrent caller stays cached.
			if status == StatusCode::UNAUTHORIZED
				&& self.tokens.invalidate_token(scope, token).await?
			{
				span.note("data endpoint rejected the token; evicted it");
			}

			return Err(status_error(status.as_u16(), &body).into());
		}

		decode_body(&body)
	}
}

fn status_error(status: u16, body: &[u8]) -> ApiError {
	let (code, description) = match serde_json::from_slice::<ErrorBody>(body) {
		Ok(ErrorBody { error, error_description }) => (
			error.unwrap_or_else(|| UNKNOWN_CODE.into()),
			error_description.unwrap_or_else(|| UNKNOWN_DESCRIPTION.into()),
		),
		Err(_) => (UNPARSABLE_CODE.into(), UNPARSABLE_DESCRIPTION.into()),
	};

	ApiError::Status { status, code, description }
}

fn decode_body<T>(body: &[u8]) -> Result<T>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| ApiError::Decode { source }.into())
}
