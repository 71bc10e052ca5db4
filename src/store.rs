//! Token cache contract and the built-in in-memory store.
//!
//! The [`TokenManager`](crate::manager::TokenManager) keeps at most one record per scope name
//! in its store: saving a record for a scope supersedes whatever was cached for it.

pub mod memory;

pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{ScopeName, TokenRecord},
};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract for cached token records keyed by scope name.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Persists a record, replacing any record cached for the same scope.
	fn save(&self, record: TokenRecord) -> StoreFuture<'_, ()>;

	/// Fetches the record cached for the scope, if present.
	fn fetch<'a>(&'a self, scope: &'a ScopeName) -> StoreFuture<'a, Option<TokenRecord>>;

	/// Removes and returns the record cached for the scope.
	fn evict<'a>(&'a self, scope: &'a ScopeName) -> StoreFuture<'a, Option<TokenRecord>>;
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// self
	use super::*;

	#[test]
	fn store_error_converts_into_crate_error_with_source() {
		let store_error = StoreError::Backend { message: "cache unreachable".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("cache unreachable"));

		let source = StdError::source(&error)
			.expect("Crate error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}
}
