//! Thread-safe in-memory [`TokenStore`] implementation.

// self
use crate::{
	_prelude::*,
	auth::{ScopeName, TokenRecord},
	store::{StoreError, StoreFuture, TokenStore},
};

type StoreMap = Arc<RwLock<HashMap<ScopeName, TokenRecord>>>;

/// Process-local token cache; the default backend of the token manager.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Number of cached records, fresh or not.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is cached.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn save_now(map: StoreMap, record: TokenRecord) -> Result<(), StoreError> {
		map.write().insert(record.scope.clone(), record);

		Ok(())
	}

	fn fetch_now(map: StoreMap, scope: ScopeName) -> Option<TokenRecord> {
		map.read().get(&scope).cloned()
	}

	fn evict_now(map: StoreMap, scope: ScopeName) -> Option<TokenRecord> {
		map.write().remove(&scope)
	}
}
impl TokenStore for MemoryStore {
	fn save(&self, record: TokenRecord) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move { Self::save_now(map, record) })
	}

	fn fetch<'a>(&'a self, scope: &'a ScopeName) -> StoreFuture<'a, Option<TokenRecord>> {
		let map = self.0.clone();
		let scope = scope.to_owned();

		Box::pin(async move { Ok(Self::fetch_now(map, scope)) })
	}

	fn evict<'a>(&'a self, scope: &'a ScopeName) -> StoreFuture<'a, Option<TokenRecord>> {
		let map = self.0.clone();
		let scope = scope.to_owned();

		Box::pin(async move { Ok(Self::evict_now(map, scope)) })
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn record(scope: &ScopeName, access: &str) -> TokenRecord {
		TokenRecord::builder(scope.clone())
			.access_token(access)
			.issued_at(macros::datetime!(2025-11-10 12:00 UTC))
			.expires_in(Duration::hours(1))
			.build()
			.expect("Token record fixture should build successfully.")
	}

	#[tokio::test]
	async fn save_supersedes_previous_record_for_scope() {
		let store = MemoryStore::default();
		let scope = ScopeName::new("wholesale_market").expect("Scope fixture should be valid.");

		store.save(record(&scope, "first")).await.expect("First save should succeed.");
		store.save(record(&scope, "second")).await.expect("Second save should succeed.");

		let fetched = store
			.fetch(&scope)
			.await
			.expect("Fetch should succeed.")
			.expect("Record should be cached.");

		assert_eq!(fetched.access_token.expose(), "second");
		assert_eq!(store.len(), 1);
	}

	#[tokio::test]
	async fn scopes_are_isolated_and_evictable() {
		let store = MemoryStore::default();
		let market = ScopeName::new("wholesale_market").expect("Scope fixture should be valid.");
		let load =
			ScopeName::new("short_term_consumption").expect("Scope fixture should be valid.");

		store.save(record(&market, "market-token")).await.expect("Save should succeed.");

		assert!(store.fetch(&load).await.expect("Fetch should succeed.").is_none());

		let evicted = store.evict(&market).await.expect("Evict should succeed.");

		assert_eq!(evicted.map(|r| r.access_token.expose().to_owned()), Some("market-token".into()));
		assert!(store.is_empty());
		assert!(store.evict(&market).await.expect("Second evict should succeed.").is_none());
	}
}
