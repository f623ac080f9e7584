//! Basket synchronization.
//!
//! [`BasketSync`] keeps the cached basket in step with the server. Mutations
//! patch the cached copy first so readers see the change immediately, then
//! call the server and replace the copy with a fresh fetch. A failed call or
//! fetch restores the exact snapshot taken when the patch was applied.
//!
//! Concurrent mutations of one basket are not serialized: the last write to
//! the cache wins. Only basket creation is, so that two adds racing on an
//! empty identity create a single basket.

mod patch;

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use tracing::{debug, info, warn};

use crate::{
    api::BasketApi,
    cache::{Cache, QueryKey, keys},
    checkout::{self, CheckoutOutcome, CheckoutWidget},
    error::{ApiError, ErrorCode, TebexError, classify},
    identity::IdentityStore,
    models::{Basket, NewBasket, NewBasketItem, PackageId, Promotion},
    retry::RetryPolicy,
};

/// Called with every error the engine surfaces.
pub type ErrorCallback = Arc<dyn Fn(&TebexError) + Send + Sync>;

/// Engine settings.
#[derive(Clone)]
pub struct BasketOptions {
    /// Cache namespace, usually the webstore token.
    pub namespace: String,

    /// Redirect target after payment, sent on basket creation.
    pub complete_url: String,

    /// Redirect target when checkout is abandoned, sent on basket creation.
    pub cancel_url: String,

    /// Retry policy for basket reads.
    pub retry: RetryPolicy,

    /// Hook for surfaced errors.
    pub on_error: Option<ErrorCallback>,
}

impl BasketOptions {
    /// Options for `namespace` with the default read retry policy.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            complete_url: String::new(),
            cancel_url: String::new(),
            retry: RetryPolicy::default(),
            on_error: None,
        }
    }

    /// Set the checkout redirect targets.
    #[must_use]
    pub fn with_urls(
        mut self,
        complete_url: impl Into<String>,
        cancel_url: impl Into<String>,
    ) -> Self {
        self.complete_url = complete_url.into();
        self.cancel_url = cancel_url.into();
        self
    }

    /// Set the read retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the hook for surfaced errors.
    #[must_use]
    pub fn on_error(mut self, callback: impl Fn(&TebexError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }
}

impl Debug for BasketOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("BasketOptions")
            .field("namespace", &self.namespace)
            .field("complete_url", &self.complete_url)
            .field("cancel_url", &self.cancel_url)
            .field("retry", &self.retry)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Where the engine is in the basket lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasketPhase {
    /// No basket identifier is stored.
    NoBasket,

    /// A basket is being created.
    Creating,

    /// A basket exists and nothing is in flight.
    Ready,

    /// A mutation is awaiting the server.
    Mutating,
}

struct Tracked<'a>(&'a AtomicUsize);

impl<'a> Tracked<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);

        Self(counter)
    }
}

impl Drop for Tracked<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Optimistic basket engine.
pub struct BasketSync {
    api: Arc<dyn BasketApi>,
    cache: Arc<dyn Cache<Basket>>,
    identity: Arc<IdentityStore>,
    options: BasketOptions,
    creation: tokio::sync::Mutex<()>,
    creating: AtomicUsize,
    in_flight: AtomicUsize,
    last_error: Mutex<Option<TebexError>>,
}

impl BasketSync {
    /// Engine over the given collaborators.
    ///
    /// Clearing the basket through `identity`, including by logging out,
    /// drops its cache entry.
    pub fn new(
        api: Arc<dyn BasketApi>,
        cache: Arc<dyn Cache<Basket>>,
        identity: Arc<IdentityStore>,
        options: BasketOptions,
    ) -> Self {
        let listener_cache = Arc::clone(&cache);
        let namespace = options.namespace.clone();

        identity.on_basket_cleared(move |ident| {
            info!(basket = ident, "basket cleared");
            listener_cache.remove(&keys::basket(&namespace, ident));
        });

        Self {
            api,
            cache,
            identity,
            options,
            creation: tokio::sync::Mutex::new(()),
            creating: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            last_error: Mutex::new(None),
        }
    }

    /// Identity store the engine reads the user and basket from.
    pub fn identity(&self) -> &Arc<IdentityStore> {
        &self.identity
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> BasketPhase {
        if self.creating.load(Ordering::SeqCst) > 0 {
            BasketPhase::Creating
        } else if self.identity.basket_ident().is_none() {
            BasketPhase::NoBasket
        } else if self.in_flight.load(Ordering::SeqCst) > 0 {
            BasketPhase::Mutating
        } else {
            BasketPhase::Ready
        }
    }

    /// Last error surfaced by a mutation or read, cleared by the next
    /// successful mutation.
    pub fn last_error(&self) -> Option<TebexError> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cached basket, without touching the server.
    pub fn cached(&self) -> Option<Basket> {
        let ident = self.identity.basket_ident()?;

        self.cache.get(&self.key(&ident))
    }

    /// The live basket.
    ///
    /// Served from the cache while fresh. A completed or vanished basket is
    /// abandoned and reads as `None`.
    ///
    /// # Errors
    ///
    /// Returns the classified error of the final fetch attempt.
    pub async fn basket(&self) -> Result<Option<Basket>, TebexError> {
        let Some(ident) = self.identity.basket_ident() else {
            return Ok(None);
        };

        let key = self.key(&ident);

        if !self.cache.is_stale(&key)
            && let Some(basket) = self.cache.get(&key)
        {
            if basket.complete {
                self.abandon(&ident, "completed");
                return Ok(None);
            }

            return Ok(Some(basket));
        }

        self.fetch(&ident).await
    }

    /// Re-fetch the basket regardless of the cache.
    ///
    /// # Errors
    ///
    /// Returns the classified error of the final fetch attempt.
    pub async fn refresh(&self) -> Result<Option<Basket>, TebexError> {
        let Some(ident) = self.identity.basket_ident() else {
            return Ok(None);
        };

        self.fetch(&ident).await
    }

    /// Abandon the current basket, returning its identifier.
    pub fn clear(&self) -> Option<String> {
        self.identity.clear_basket()
    }

    /// Add a package, creating the basket first if needed.
    ///
    /// # Errors
    ///
    /// Returns `NOT_AUTHENTICATED` when no user is stored, before any remote
    /// call. Otherwise returns the classified creation or server error, after
    /// rolling back the optimistic patch.
    pub async fn add_package(&self, item: &NewBasketItem) -> Result<Option<Basket>, TebexError> {
        let Some(user_id) = self.identity.user_id() else {
            return Err(self.surface(TebexError::not_authenticated()));
        };

        let ident = self.ensure_basket(&user_id).await?;
        let key = self.key(&ident);
        let _mutating = Tracked::enter(&self.in_flight);

        self.cache.cancel_in_flight(&key);

        let snapshot = self
            .cache
            .update(&key, &mut |basket| patch::add_package(basket, item));

        debug!(
            basket = %ident,
            package = item.package_id,
            quantity = item.quantity,
            patched = snapshot.is_some(),
            "adding package"
        );

        let result = self.api.add_item(&ident, item).await;

        self.settle(&ident, snapshot, result).await
    }

    /// Remove a package line.
    ///
    /// The quantity sent to the server is the one the line had in the cache
    /// when it was removed from it.
    ///
    /// # Errors
    ///
    /// Returns `BASKET_NOT_FOUND` without a live basket, otherwise the
    /// classified server error after rolling back.
    pub async fn remove_package(&self, package_id: PackageId) -> Result<Option<Basket>, TebexError> {
        let ident = self.require_ident()?;
        let key = self.key(&ident);

        if self.cache.get(&key).is_none() && self.fetch(&ident).await?.is_none() {
            return Err(self.surface(TebexError::basket_not_found()));
        }

        let _mutating = Tracked::enter(&self.in_flight);

        self.cache.cancel_in_flight(&key);

        let mut previous_quantity = None;
        let snapshot = self.cache.update(&key, &mut |basket| {
            previous_quantity = patch::remove_package(basket, package_id);
        });

        debug!(
            basket = %ident,
            package = package_id,
            ?previous_quantity,
            "removing package"
        );

        let result = self
            .api
            .remove_item(&ident, package_id, previous_quantity.unwrap_or_default())
            .await;

        self.settle(&ident, snapshot, result).await
    }

    /// Set a line's quantity. Zero is forwarded unchanged.
    ///
    /// # Errors
    ///
    /// Returns `BASKET_NOT_FOUND` without a live basket, otherwise the
    /// classified server error after rolling back.
    pub async fn update_quantity(
        &self,
        package_id: PackageId,
        quantity: u32,
    ) -> Result<Option<Basket>, TebexError> {
        let ident = self.require_ident()?;
        let key = self.key(&ident);
        let _mutating = Tracked::enter(&self.in_flight);

        self.cache.cancel_in_flight(&key);

        let snapshot = self.cache.update(&key, &mut |basket| {
            patch::set_quantity(basket, package_id, quantity);
        });

        debug!(basket = %ident, package = package_id, quantity, "updating quantity");

        let result = self
            .api
            .update_item_quantity(&ident, package_id, quantity)
            .await;

        self.settle(&ident, snapshot, result).await
    }

    /// Apply a coupon, gift card or creator code.
    ///
    /// # Errors
    ///
    /// Returns `BASKET_NOT_FOUND` without a live basket, otherwise the
    /// classified server error. The cache is untouched on failure.
    pub async fn apply_promotion(&self, promotion: &Promotion) -> Result<(), TebexError> {
        let ident = self.require_ident()?;
        let _mutating = Tracked::enter(&self.in_flight);

        let result = self.api.apply_promotion(&ident, promotion).await;

        self.settle_promotion(&ident, promotion, "applied", result)
    }

    /// Remove a coupon, gift card or creator code.
    ///
    /// # Errors
    ///
    /// Returns `BASKET_NOT_FOUND` without a live basket, otherwise the
    /// classified server error. The cache is untouched on failure.
    pub async fn remove_promotion(&self, promotion: &Promotion) -> Result<(), TebexError> {
        let ident = self.require_ident()?;
        let _mutating = Tracked::enter(&self.in_flight);

        let result = self.api.remove_promotion(&ident, promotion).await;

        self.settle_promotion(&ident, promotion, "removed", result)
    }

    /// Open the checkout for the current basket. A completed payment
    /// abandons the basket.
    ///
    /// # Errors
    ///
    /// Returns `BASKET_NOT_FOUND` without a live basket, or the widget's
    /// failure.
    pub async fn launch_checkout(
        &self,
        widget: &dyn CheckoutWidget,
    ) -> Result<CheckoutOutcome, TebexError> {
        let ident = self.require_ident()?;

        let outcome = checkout::launch(widget, &ident)
            .await
            .map_err(|error| self.surface(error))?;

        if outcome == CheckoutOutcome::Completed {
            self.abandon(&ident, "checkout completed");
        }

        Ok(outcome)
    }

    fn key(&self, ident: &str) -> QueryKey {
        keys::basket(&self.options.namespace, ident)
    }

    /// Stored identifier, unless the cached copy shows it completed.
    fn live_ident(&self) -> Option<String> {
        let ident = self.identity.basket_ident()?;

        if self
            .cache
            .get(&self.key(&ident))
            .is_some_and(|basket| basket.complete)
        {
            self.abandon(&ident, "completed");
            return None;
        }

        Some(ident)
    }

    fn require_ident(&self) -> Result<String, TebexError> {
        self.live_ident()
            .ok_or_else(|| self.surface(TebexError::basket_not_found()))
    }

    async fn ensure_basket(&self, user_id: &str) -> Result<String, TebexError> {
        if let Some(ident) = self.live_ident() {
            return Ok(ident);
        }

        let _creation = self.creation.lock().await;

        if let Some(ident) = self.live_ident() {
            return Ok(ident);
        }

        let _creating = Tracked::enter(&self.creating);

        let request = NewBasket {
            username: user_id.to_string(),
            complete_url: self.options.complete_url.clone(),
            cancel_url: self.options.cancel_url.clone(),
        };

        let basket = self
            .api
            .create_basket(&request)
            .await
            .map_err(|error| self.surface(classify(error)))?;

        info!(basket = %basket.ident, user = user_id, "basket created");

        self.identity.set_basket_ident(&basket.ident);
        self.cache.set(&self.key(&basket.ident), basket.clone());

        Ok(basket.ident)
    }

    async fn fetch(&self, ident: &str) -> Result<Option<Basket>, TebexError> {
        let key = self.key(ident);
        let generation = self.cache.generation(&key);
        let api = &self.api;

        match self.options.retry.run(move || api.get_basket(ident)).await {
            Ok(basket) if basket.complete => {
                self.abandon(ident, "completed");
                Ok(None)
            }
            Ok(basket) => {
                if self.cache.set_if_current(&key, basket.clone(), generation) {
                    debug!(%key, "basket cached");
                    return Ok(Some(basket));
                }

                debug!(%key, "basket fetch superseded");

                Ok(self
                    .cache
                    .get(&key)
                    .or_else(|| self.is_current(ident).then_some(basket)))
            }
            Err(error)
                if matches!(
                    error.code,
                    ErrorCode::BasketNotFound | ErrorCode::BasketExpired
                ) =>
            {
                self.abandon(ident, error.code.as_str());
                Ok(None)
            }
            Err(error) => Err(self.surface(error)),
        }
    }

    async fn settle(
        &self,
        ident: &str,
        snapshot: Option<Basket>,
        result: Result<(), ApiError>,
    ) -> Result<Option<Basket>, TebexError> {
        let key = self.key(ident);

        if let Err(error) = result {
            let error = classify(error);

            self.restore(ident, snapshot);

            return Err(self.surface(error));
        }

        if !self.is_current(ident) {
            debug!(basket = ident, "basket abandoned while mutating");
            self.clear_last_error();
            return Ok(None);
        }

        let api = &self.api;

        match self.options.retry.run(move || api.get_basket(ident)).await {
            Ok(basket) if basket.complete => {
                self.clear_last_error();
                self.abandon(ident, "completed");
                Ok(None)
            }
            Ok(basket) if self.is_current(ident) => {
                debug!(%key, "basket reconciled");
                self.clear_last_error();
                self.cache.set(&key, basket.clone());
                Ok(Some(basket))
            }
            Ok(_) => {
                debug!(basket = ident, "basket abandoned while reconciling");
                self.clear_last_error();
                Ok(None)
            }
            Err(error) => {
                self.restore(ident, snapshot);
                Err(self.surface(error))
            }
        }
    }

    /// Put back the entry as it was before the optimistic patch.
    fn restore(&self, ident: &str, snapshot: Option<Basket>) {
        if !self.is_current(ident) {
            debug!(basket = ident, "basket abandoned, skipping rollback");
            return;
        }

        let key = self.key(ident);

        warn!(basket = ident, "rolling back optimistic update");

        match snapshot {
            Some(snapshot) => self.cache.set(&key, snapshot),
            None => self.cache.remove(&key),
        }
    }

    fn is_current(&self, ident: &str) -> bool {
        self.identity.basket_ident().as_deref() == Some(ident)
    }

    fn settle_promotion(
        &self,
        ident: &str,
        promotion: &Promotion,
        action: &str,
        result: Result<(), ApiError>,
    ) -> Result<(), TebexError> {
        result.map_err(|error| self.surface(classify(error)))?;

        info!(basket = ident, kind = ?promotion.kind(), code = promotion.code(), "promotion {action}");

        self.clear_last_error();
        self.cache.invalidate(&self.key(ident));

        Ok(())
    }

    fn abandon(&self, ident: &str, reason: &str) {
        info!(basket = ident, reason, "abandoning basket");

        if self.is_current(ident) {
            self.identity.clear_basket();
        }

        self.cache.remove(&self.key(ident));
    }

    fn surface(&self, error: TebexError) -> TebexError {
        warn!(code = %error.code, "{}", error.message);

        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(error.clone());

        if let Some(callback) = &self.options.on_error {
            callback(&error);
        }

        error
    }

    fn clear_last_error(&self) {
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Debug for BasketSync {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("BasketSync")
            .field("identity", &self.identity)
            .field("options", &self.options)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}
