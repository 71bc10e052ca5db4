//! Per-scope token lifecycle: registration, cached lookups, lazy refresh, singleflight guards.
//!
//! [`TokenManager::get_token`] returns the cached token while `now < expires_at - margin`
//! and otherwise runs one client-credentials exchange against the scope's token endpoint.
//! Concurrent callers for the same stale scope queue on a per-scope guard and re-read the
//! cache once they hold it, so only the first of them reaches the network. A failed exchange
//! never touches the cache; callers that queued behind it receive the same [`AuthError`].

mod metrics;

pub use self::metrics::GrantMetrics;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{EndpointScope, ScopeName, TokenRecord, TokenSecret},
	error::{AuthError, ConfigError},
	http::TokenHttpClient,
	oauth::{GrantExchange, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::TokenStore,
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper, store::MemoryStore};

/// Token manager specialized for the crate's default reqwest transport stack.
#[cfg(feature = "reqwest")]
pub type ReqwestTokenManager = TokenManager<ReqwestHttpClient, ReqwestTransportErrorMapper>;

type ScopeMap = Arc<RwLock<HashMap<ScopeName, EndpointScope>>>;
type FlightMap = Arc<Mutex<HashMap<ScopeName, Arc<Flight>>>>;

/// Singleflight state of one scope.
///
/// `generation` advances each time an exchange finishes; `failure` holds the error of the most
/// recent one, if it failed. Both are only written while `lock` is held.
#[derive(Default)]
struct Flight {
	lock: AsyncMutex<()>,
	generation: AtomicU64,
	failure: Mutex<Option<AuthError>>,
}
impl Flight {
	fn generation(&self) -> u64 {
		self.generation.load(Ordering::Acquire)
	}

	/// Failure of an exchange that finished after `joined` was observed.
	fn failure_since(&self, joined: u64) -> Option<AuthError> {
		if self.generation() == joined {
			return None;
		}

		self.failure.lock().clone()
	}

	fn finish(&self, outcome: Result<&TokenRecord, &Error>) {
		*self.failure.lock() = match outcome {
			Err(Error::Auth(err)) => Some(err.clone()),
			_ => None,
		};
		self.generation.fetch_add(1, Ordering::AcqRel);
	}
}

/// Supplies valid bearer tokens for registered endpoint scopes.
///
/// Cloning is cheap and every clone shares the same scope registry, token store, guards,
/// and counters, so one instance can be handed to every component that needs tokens.
pub struct TokenManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	http_client: Arc<C>,
	transport_mapper: Arc<M>,
	store: Arc<dyn TokenStore>,
	safety_margin: Duration,
	metrics: Arc<GrantMetrics>,
	scopes: ScopeMap,
	flights: FlightMap,
}
impl<C, M> TokenManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Default margin subtracted from a token's expiry before it stops being served.
	pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::seconds(60);

	/// Creates a manager that reuses the caller-provided store, transport, and mapper.
	pub fn with_http_client(
		store: Arc<dyn TokenStore>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			store,
			safety_margin: Self::DEFAULT_SAFETY_MARGIN,
			metrics: Default::default(),
			scopes: Default::default(),
			flights: Default::default(),
		}
	}

	/// Overrides the safety margin; negative values are clamped to zero.
	pub fn with_safety_margin(mut self, margin: Duration) -> Self {
		self.safety_margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}

	/// Returns the configured safety margin.
	pub fn safety_margin(&self) -> Duration {
		self.safety_margin
	}

	/// Returns the grant counters shared by every clone of this manager.
	pub fn metrics(&self) -> &GrantMetrics {
		&self.metrics
	}

	/// Returns the token store backing this manager.
	pub fn store(&self) -> &Arc<dyn TokenStore> {
		&self.store
	}

	/// Adds or replaces the definition of `scope`.
	///
	/// Re-registering an identical definition is a no-op. Replacing it with different
	/// credentials or a different endpoint evicts the token cached for the old definition.
	pub async fn register_scope(
		&self,
		scope: impl AsRef<str>,
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
		token_endpoint: Url,
	) -> Result<()> {
		let endpoint = EndpointScope::new(scope, client_id, client_secret, token_endpoint)
			.map_err(ConfigError::from)?;

		self.register(endpoint).await
	}

	/// Adds or replaces a prebuilt definition; see [`TokenManager::register_scope`].
	///
	/// Waits for an in-flight exchange of the same scope, so a token minted for the old
	/// definition is never left in the cache.
	pub async fn register(&self, endpoint: EndpointScope) -> Result<()> {
		endpoint.validate().map_err(ConfigError::from)?;

		let name = endpoint.name.clone();
		let flight = self.flight(&name);
		let _singleflight = flight.lock.lock().await;
		let previous = self.scopes.write().insert(name.clone(), endpoint.clone());

		if previous.is_some_and(|previous| previous != endpoint) {
			FlowSpan::new(FlowKind::ClientCredentials, "register", &name)
				.note("definition replaced; evicting cached token");
			<dyn TokenStore>::evict(self.store.as_ref(), &name).await?;
		}

		Ok(())
	}

	/// Removes a definition and evicts its cached token; returns the removed definition.
	pub async fn unregister_scope(&self, scope: &str) -> Result<Option<EndpointScope>> {
		let flight = self.flights.lock().get(scope).cloned().unwrap_or_default();
		let _singleflight = flight.lock.lock().await;
		let removed = self.scopes.write().remove(scope);

		if let Some(endpoint) = &removed {
			self.flights.lock().remove(scope);
			<dyn TokenStore>::evict(self.store.as_ref(), &endpoint.name).await?;
		}

		Ok(removed)
	}

	/// Returns `true` when `scope` has a definition.
	pub fn is_registered(&self, scope: &str) -> bool {
		self.scopes.read().contains_key(scope)
	}

	/// Lists registered scope names in lexical order.
	pub fn scopes(&self) -> Vec<ScopeName> {
		let mut names = self.scopes.read().keys().cloned().collect::<Vec<_>>();

		names.sort();

		names
	}

	/// Returns a valid access token for `scope`, refreshing it when needed.
	///
	/// Fails with [`ConfigError::UnknownScope`] (and no network call) for an unregistered
	/// scope, and with [`crate::error::AuthError`] when the grant exchange fails.
	pub async fn get_token(&self, scope: impl AsRef<str>) -> Result<TokenSecret> {
		self.get_record(scope).await.map(|record| record.access_token)
	}

	/// Same as [`TokenManager::get_token`] but returns the whole cached record.
	pub async fn get_record(&self, scope: impl AsRef<str>) -> Result<TokenRecord> {
		const KIND: FlowKind = FlowKind::ClientCredentials;

		let scope = scope.as_ref();
		let span = FlowSpan::new(KIND, "get_token", scope);

		span.instrument(async {
			let endpoint = self.endpoint(scope)?;

			if let Some(record) = self.fresh_record(&endpoint.name).await? {
				span.note("serving cached token");
				self.record_cache_hit();

				return Ok(record);
			}

			let flight = self.flight(&endpoint.name);
			let joined = flight.generation();
			let _singleflight = flight.lock.lock().await;

			// Another caller may have refreshed while this one waited on the guard.
			if let Some(record) = self.fresh_record(&endpoint.name).await? {
				span.note("token refreshed by a concurrent caller");
				self.record_cache_hit();

				return Ok(record);
			}
			if let Some(err) = flight.failure_since(joined) {
				span.note("concurrent exchange failed; sharing its error");

				return Err(err.into());
			}

			// The definition may have been replaced while this caller waited.
			let endpoint = self.endpoint(scope)?;

			span.note("cached token missing or stale; exchanging client credentials");
			obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
			self.metrics.record_attempt();

			let result = self.refresh(&endpoint).await;

			flight.finish(result.as_ref());

			match &result {
				Ok(_) => {
					obs::record_flow_outcome(KIND, FlowOutcome::Success);
					self.metrics.record_success();
				},
				Err(_) => {
					obs::record_flow_outcome(KIND, FlowOutcome::Failure);
					self.metrics.record_failure();
				},
			}

			result
		})
		.await
	}

	/// Evicts the cached token of `scope` only if it is still `token`.
	///
	/// Returns `false` when the cache is empty or already holds a different token, for example
	/// one refreshed by a concurrent caller after `token` was rejected.
	pub async fn invalidate_token(
		&self,
		scope: impl AsRef<str>,
		token: &TokenSecret,
	) -> Result<bool> {
		let endpoint = self.endpoint(scope.as_ref())?;
		let flight = self.flight(&endpoint.name);
		let _singleflight = flight.lock.lock().await;
		let cached = <dyn TokenStore>::fetch(self.store.as_ref(), &endpoint.name).await?;

		if !cached.is_some_and(|record| record.access_token == *token) {
			return Ok(false);
		}

		FlowSpan::new(FlowKind::ClientCredentials, "invalidate", &endpoint.name)
			.note("evicting rejected token");
		<dyn TokenStore>::evict(self.store.as_ref(), &endpoint.name).await?;

		Ok(true)
	}

	/// Evicts the cached token of `scope` so the next lookup runs a grant exchange.
	pub async fn invalidate(&self, scope: impl AsRef<str>) -> Result<Option<TokenRecord>> {
		let endpoint = self.endpoint(scope.as_ref())?;

		FlowSpan::new(FlowKind::ClientCredentials, "invalidate", &endpoint.name)
			.note("evicting cached token");

		Ok(<dyn TokenStore>::evict(self.store.as_ref(), &endpoint.name).await?)
	}

	fn endpoint(&self, scope: &str) -> Result<EndpointScope> {
		self.scopes
			.read()
			.get(scope)
			.cloned()
			.ok_or_else(|| ConfigError::UnknownScope { scope: scope.to_owned() }.into())
	}

	async fn fresh_record(&self, scope: &ScopeName) -> Result<Option<TokenRecord>> {
		let now = OffsetDateTime::now_utc();
		let cached = <dyn TokenStore>::fetch(self.store.as_ref(), scope).await?;

		Ok(cached.filter(|record| record.is_fresh_at(now, self.safety_margin)))
	}

	async fn refresh(&self, endpoint: &EndpointScope) -> Result<TokenRecord> {
		let record = GrantExchange::for_scope(
			endpoint,
			self.http_client.as_ref(),
			self.transport_mapper.as_ref(),
		)?
		.exchange()
		.await?;
		let still_current = self.scopes.read().get(&endpoint.name) == Some(endpoint);

		// A definition replaced mid-exchange must not inherit a token minted for the old one.
		if still_current {
			<dyn TokenStore>::save(self.store.as_ref(), record.clone()).await?;
		}

		Ok(record)
	}

	fn flight(&self, scope: &ScopeName) -> Arc<Flight> {
		let mut flights = self.flights.lock();

		flights.entry(scope.clone()).or_default().clone()
	}

	fn record_cache_hit(&self) {
		obs::record_flow_outcome(FlowKind::ClientCredentials, FlowOutcome::CacheHit);
		self.metrics.record_cache_hit();
	}
}
#[cfg(feature = "reqwest")]
impl TokenManager<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a manager with an in-memory store and a reqwest transport that does not follow
	/// redirects.
	pub fn new() -> Result<Self> {
		Ok(Self::with_http_client(
			Arc::new(MemoryStore::default()),
			ReqwestHttpClient::new()?,
			Arc::new(ReqwestTransportErrorMapper),
		))
	}
}
impl<C, M> Clone for TokenManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			transport_mapper: self.transport_mapper.clone(),
			store: self.store.clone(),
			safety_margin: self.safety_margin,
			metrics: self.metrics.clone(),
			scopes: self.scopes.clone(),
			flights: self.flights.clone(),
		}
	}
}
impl<C, M> Debug for TokenManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("scopes", &self.scopes())
			.field("safety_margin", &self.safety_margin)
			.field("metrics", &self.metrics)
			.finish()
	}
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// self
	use super::*;
	use crate::auth::ApiService;

	fn token_url() -> Url {
		Url::parse("https://digital.iservices.rte-france.com/token/oauth/")
			.expect("Token URL fixture should parse.")
	}

	#[tokio::test]
	async fn unknown_scope_fails_with_config_error() {
		let manager = ReqwestTokenManager::new().expect("Manager should build.");
		let err = manager
			.get_token(ApiService::WholesaleMarket)
			.await
			.expect_err("Unregistered scopes must be rejected.");

		assert!(matches!(
			err,
			Error::Config(ConfigError::UnknownScope { ref scope }) if scope == "wholesale_market"
		));
		assert_eq!(manager.metrics().attempts(), 0);
		assert!(matches!(
			manager.invalidate("wholesale_market").await,
			Err(Error::Config(ConfigError::UnknownScope { .. }))
		));
	}

	#[tokio::test]
	async fn registration_is_idempotent_and_replacement_evicts() {
		let (manager, store) = crate::_preludet::build_reqwest_test_manager();
		let name = ScopeName::new("wholesale_market").expect("Scope fixture should be valid.");

		manager
			.register_scope(&name, "id", "secret", token_url())
			.await
			.expect("First registration should succeed.");
		store
			.save(
				TokenRecord::builder(name.clone())
					.access_token("cached")
					.expires_in(Duration::hours(1))
					.build()
					.expect("Record fixture should build."),
			)
			.await
			.expect("Seeding the store should succeed.");
		manager
			.register_scope(&name, "id", "secret", token_url())
			.await
			.expect("Identical registration should succeed.");

		let record = manager.get_record(&name).await.expect("Cached record should be served.");

		assert_eq!(record.access_token.expose(), "cached");
		assert_eq!(manager.metrics().cache_hits(), 1);

		manager
			.register_scope(&name, "id", "rotated-secret", token_url())
			.await
			.expect("Replacement should succeed.");

		assert!(store.is_empty(), "Replacing credentials must evict the cached token.");
		assert_eq!(manager.scopes(), vec![name.clone()]);

		let removed = manager
			.unregister_scope("wholesale_market")
			.await
			.expect("Unregistering should succeed.");

		assert_eq!(
			removed.map(|endpoint| endpoint.client_secret.expose().to_owned()),
			Some("rotated-secret".into())
		);
		assert!(!manager.is_registered("wholesale_market"));
	}

	#[tokio::test]
	async fn invalidate_token_keeps_a_newer_token() {
		let (manager, store) = crate::_preludet::build_reqwest_test_manager();
		let name = ScopeName::new("short_term_consumption").expect("Scope fixture should be valid.");

		manager
			.register_scope(&name, "id", "secret", token_url())
			.await
			.expect("Registration should succeed.");
		store
			.save(
				TokenRecord::builder(name.clone())
					.access_token("refreshed")
					.expires_in(Duration::hours(1))
					.build()
					.expect("Record fixture should build."),
			)
			.await
			.expect("Seeding the store should succeed.");

		let evicted = manager
			.invalidate_token(&name, &TokenSecret::new("rejected"))
			.await
			.expect("Invalidation should succeed.");

		assert!(!evicted, "A token that was already replaced must not evict its successor.");
		assert_eq!(store.len(), 1);

		let evicted = manager
			.invalidate_token(&name, &TokenSecret::new("refreshed"))
			.await
			.expect("Invalidation should succeed.");

		assert!(evicted);
		assert!(store.is_empty());
	}

	#[test]
	fn flight_failures_reach_only_callers_that_waited() {
		let flight = Flight::default();
		let joined = flight.generation();
		let err = Error::from(AuthError::InvalidClient {
			scope: "wholesale_market".into(),
			reason: "bad secret".into(),
			status: Some(401),
		});

		assert!(flight.failure_since(joined).is_none());

		flight.finish(Err(&err));

		assert!(matches!(
			flight.failure_since(joined),
			Some(AuthError::InvalidClient { status: Some(401), .. })
		));
		assert!(flight.failure_since(flight.generation()).is_none());

		let record = TokenRecord::builder(
			ScopeName::new("wholesale_market").expect("Scope fixture should be valid."),
		)
		.access_token("fresh")
		.expires_in(Duration::hours(1))
		.build()
		.expect("Record fixture should build.");

		flight.finish(Ok(&record));

		assert!(flight.failure_since(joined).is_none());
	}

	#[tokio::test]
	async fn invalid_definitions_are_rejected() {
		let manager = ReqwestTokenManager::new().expect("Manager should build.");
		let err = manager
			.register_scope("with space", "id", "secret", token_url())
			.await
			.expect_err("Invalid scope names must be rejected.");

		assert!(matches!(err, Error::Config(ConfigError::InvalidScope(_))));
		assert!(manager.scopes().is_empty());
	}

	#[test]
	fn negative_safety_margin_is_clamped() {
		let manager = ReqwestTokenManager::new()
			.expect("Manager should build.")
			.with_safety_margin(Duration::seconds(-5));

		assert_eq!(manager.safety_margin(), Duration::ZERO);
		assert_eq!(ReqwestTokenManager::DEFAULT_SAFETY_MARGIN, Duration::seconds(60));
	}
}
