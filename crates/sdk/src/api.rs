//! Remote Tebex resources consumed by the SDK.

use async_trait::async_trait;
use mockall::automock;

use crate::{
    error::ApiError,
    models::{Basket, Category, NewBasket, NewBasketItem, Package, PackageId, Promotion, Webstore},
};

/// Remote basket resource.
///
/// Mutating calls return nothing; callers re-fetch the basket for the
/// authoritative state.
#[automock]
#[async_trait]
pub trait BasketApi: Send + Sync {
    /// Create a basket owned by `basket.username`.
    async fn create_basket(&self, basket: &NewBasket) -> Result<Basket, ApiError>;

    /// Retrieve a single basket.
    async fn get_basket(&self, ident: &str) -> Result<Basket, ApiError>;

    /// Add an item, increasing the quantity of a line already present.
    async fn add_item(&self, ident: &str, item: &NewBasketItem) -> Result<(), ApiError>;

    /// Remove a line by reducing it by its last known quantity.
    async fn remove_item(
        &self,
        ident: &str,
        package_id: PackageId,
        previous_quantity: u32,
    ) -> Result<(), ApiError>;

    /// Set the quantity of a line.
    async fn update_item_quantity(
        &self,
        ident: &str,
        package_id: PackageId,
        quantity: u32,
    ) -> Result<(), ApiError>;

    /// Apply a coupon, gift card or creator code.
    async fn apply_promotion(&self, ident: &str, promotion: &Promotion) -> Result<(), ApiError>;

    /// Remove a coupon, gift card or creator code.
    async fn remove_promotion(&self, ident: &str, promotion: &Promotion)
    -> Result<(), ApiError>;
}

/// Read-only catalog resource.
#[automock]
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Webstore metadata.
    async fn get_webstore(&self) -> Result<Webstore, ApiError>;

    /// Every category, optionally with its packages.
    async fn get_categories(&self, include_packages: bool) -> Result<Vec<Category>, ApiError>;

    /// One category with its packages.
    async fn get_category(&self, id: u64) -> Result<Category, ApiError>;

    /// Every package.
    async fn get_packages(&self) -> Result<Vec<Package>, ApiError>;

    /// One package.
    async fn get_package(&self, id: PackageId) -> Result<Package, ApiError>;
}
