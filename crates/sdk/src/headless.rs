//! SDK entry point.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
    time::Duration,
};

use crate::{
    api::BasketApi,
    basket::{BasketOptions, BasketSync, ErrorCallback},
    cache::{Cache, MemoryCache},
    catalog::{Catalog, CatalogEntry},
    error::TebexError,
    http::{ClientConfig, DEFAULT_BASE_URL, HttpClient},
    identity::{IdentityStore, StorageAdapter},
    models::Basket,
    retry::RetryPolicy,
};

/// SDK configuration.
#[derive(Clone)]
pub struct SdkConfig {
    /// Public webstore token.
    pub token: String,

    /// API root.
    pub base_url: String,

    /// Redirect target after payment.
    pub complete_url: String,

    /// Redirect target when checkout is abandoned.
    pub cancel_url: String,

    /// Per-request timeout.
    pub timeout: Option<Duration>,

    /// Retry policy for reads.
    pub retry: RetryPolicy,

    /// Hook for errors surfaced by the basket engine.
    pub on_error: Option<ErrorCallback>,
}

impl SdkConfig {
    /// Configuration for `token` against the public API.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            complete_url: String::new(),
            cancel_url: String::new(),
            timeout: None,
            retry: RetryPolicy::default(),
            on_error: None,
        }
    }
}

impl Debug for SdkConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("SdkConfig")
            .field("base_url", &self.base_url)
            .field("complete_url", &self.complete_url)
            .field("cancel_url", &self.cancel_url)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Basket engine and catalog wired to the Tebex HTTP API.
#[derive(Debug)]
pub struct TebexHeadless {
    basket: BasketSync,
    catalog: Catalog,
}

impl TebexHeadless {
    /// Wire the client, caches, identity store, engine and catalog.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_INVALID` when the token is blank or the HTTP client
    /// cannot be built.
    pub fn new(config: SdkConfig, storage: Arc<dyn StorageAdapter>) -> Result<Self, TebexError> {
        let client = Arc::new(HttpClient::new(ClientConfig {
            base_url: config.base_url,
            timeout: config.timeout,
            ..ClientConfig::new(config.token.clone())
        })?);

        let identity = Arc::new(IdentityStore::new(storage));
        let baskets: Arc<dyn Cache<Basket>> = Arc::new(MemoryCache::new());
        let entries: Arc<dyn Cache<CatalogEntry>> = Arc::new(MemoryCache::new());

        let mut options = BasketOptions::new(config.token.clone())
            .with_urls(config.complete_url, config.cancel_url)
            .with_retry(config.retry);
        options.on_error = config.on_error;

        Ok(Self {
            basket: BasketSync::new(
                Arc::clone(&client) as Arc<dyn BasketApi>,
                baskets,
                identity,
                options,
            ),
            catalog: Catalog::new(client, entries, config.token, config.retry),
        })
    }

    /// Basket engine.
    pub fn basket(&self) -> &BasketSync {
        &self.basket
    }

    /// Catalog queries.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Stored user and basket identifiers.
    pub fn identity(&self) -> &IdentityStore {
        self.basket.identity()
    }
}
