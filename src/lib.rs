//! Thin async client for RTE's public API: one OAuth 2.0 client-credentials token per endpoint
//! family, cached until a safety margin before expiry and refreshed lazily behind per-family
//! singleflight guards.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
#[cfg(feature = "reqwest")] pub mod client;
pub mod config;
pub mod error;
#[cfg(feature = "reqwest")] pub mod ext;
pub mod http;
pub mod manager;
pub mod oauth;
pub mod obs;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// crates.io
	use reqwest::redirect::Policy;
	// self
	use crate::{
		client::RteClient,
		config::ClientConfig,
		http::ReqwestHttpClient,
		manager::{ReqwestTokenManager, TokenManager},
		oauth::ReqwestTransportErrorMapper,
		store::{MemoryStore, TokenStore},
	};

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.redirect(Policy::none())
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Constructs a [`TokenManager`] backed by an in-memory store and the reqwest transport used
	/// across integration tests.
	pub fn build_reqwest_test_manager() -> (ReqwestTokenManager, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn TokenStore> = store_backend.clone();
		let manager = TokenManager::with_http_client(
			store,
			test_reqwest_http_client(),
			Arc::new(ReqwestTransportErrorMapper),
		);

		(manager, store_backend)
	}

	/// Builds an [`RteClient`] whose token and data requests both trust `httpmock` certificates,
	/// with every family in `config` registered on a fresh test manager.
	pub async fn build_reqwest_test_client(config: &ClientConfig) -> (RteClient, Arc<MemoryStore>) {
		let (manager, store) = build_reqwest_test_manager();

		for endpoint in config.endpoint_scopes().expect("Test config should yield valid scopes.") {
			manager.register(endpoint).await.expect("Test scope should register.");
		}

		let client = RteClient::with_http_client(config, test_reqwest_http_client().0, manager)
			.expect("Failed to build RTE client for tests.");

		(client, store)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
