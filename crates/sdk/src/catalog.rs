//! Catalog queries.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    future::Future,
    sync::Arc,
};

use tracing::debug;

use crate::{
    api::CatalogApi,
    cache::{Cache, QueryKey, keys},
    error::{ApiError, TebexError},
    models::{Category, Package, PackageId, Webstore},
    retry::RetryPolicy,
};

/// A cached catalog response.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEntry {
    /// Webstore metadata.
    Webstore(Webstore),

    /// Category listing.
    Categories(Vec<Category>),

    /// One category.
    Category(Category),

    /// Package listing.
    Packages(Vec<Package>),

    /// One package.
    Package(Package),
}

trait Cached: Sized {
    fn into_entry(self) -> CatalogEntry;

    fn from_entry(entry: CatalogEntry) -> Option<Self>;
}

macro_rules! cached {
    ($type:ty, $variant:ident) => {
        impl Cached for $type {
            fn into_entry(self) -> CatalogEntry {
                CatalogEntry::$variant(self)
            }

            fn from_entry(entry: CatalogEntry) -> Option<Self> {
                match entry {
                    CatalogEntry::$variant(value) => Some(value),
                    _ => None,
                }
            }
        }
    };
}

cached!(Webstore, Webstore);
cached!(Vec<Category>, Categories);
cached!(Category, Category);
cached!(Vec<Package>, Packages);
cached!(Package, Package);

/// Read-only catalog with cached queries.
pub struct Catalog {
    api: Arc<dyn CatalogApi>,
    cache: Arc<dyn Cache<CatalogEntry>>,
    namespace: String,
    retry: RetryPolicy,
}

impl Catalog {
    /// Catalog over `api`, caching under `namespace`.
    pub fn new(
        api: Arc<dyn CatalogApi>,
        cache: Arc<dyn Cache<CatalogEntry>>,
        namespace: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            api,
            cache,
            namespace: namespace.into(),
            retry,
        }
    }

    /// Webstore metadata.
    ///
    /// # Errors
    ///
    /// Returns the classified error of the final fetch attempt.
    pub async fn webstore(&self) -> Result<Webstore, TebexError> {
        let api = &self.api;

        self.query(keys::webstore(&self.namespace), move || api.get_webstore())
            .await
    }

    /// Every category, optionally with its packages.
    ///
    /// # Errors
    ///
    /// Returns the classified error of the final fetch attempt.
    pub async fn categories(&self, include_packages: bool) -> Result<Vec<Category>, TebexError> {
        let api = &self.api;

        self.query(keys::categories(&self.namespace, include_packages), move || {
            api.get_categories(include_packages)
        })
        .await
    }

    /// One category with its packages.
    ///
    /// # Errors
    ///
    /// Returns `CATEGORY_NOT_FOUND` for an unknown id, or the classified
    /// error of the final fetch attempt.
    pub async fn category(&self, id: u64) -> Result<Category, TebexError> {
        let api = &self.api;

        self.query(keys::category(&self.namespace, id), move || api.get_category(id))
            .await
    }

    /// Every package.
    ///
    /// # Errors
    ///
    /// Returns the classified error of the final fetch attempt.
    pub async fn packages(&self) -> Result<Vec<Package>, TebexError> {
        let api = &self.api;

        self.query(keys::packages(&self.namespace), move || api.get_packages())
            .await
    }

    /// One package.
    ///
    /// # Errors
    ///
    /// Returns `PACKAGE_NOT_FOUND` for an unknown id, or the classified error
    /// of the final fetch attempt.
    pub async fn package(&self, id: PackageId) -> Result<Package, TebexError> {
        let api = &self.api;

        self.query(keys::package(&self.namespace, id), move || api.get_package(id))
            .await
    }

    /// Mark every catalog entry stale. Baskets are not affected.
    pub fn invalidate_all(&self) {
        let root = keys::root(&self.namespace);

        for section in ["webstore", "categories", "category", "packages"] {
            self.cache.invalidate(&root.child(section));
        }
    }

    async fn query<T, F, Fut>(&self, key: QueryKey, fetch: F) -> Result<T, TebexError>
    where
        T: Cached + Clone,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        if !self.cache.is_stale(&key)
            && let Some(value) = self.cache.get(&key).and_then(T::from_entry)
        {
            return Ok(value);
        }

        let generation = self.cache.generation(&key);
        let value = self.retry.run(fetch).await?;

        if self.cache.set_if_current(&key, value.clone().into_entry(), generation) {
            debug!(%key, "catalog entry cached");
        } else {
            debug!(%key, "catalog fetch superseded");
        }

        Ok(value)
    }
}

impl Debug for Catalog {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Catalog")
            .field("namespace", &self.namespace)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use testresult::TestResult;

    use crate::{api::MockCatalogApi, cache::MemoryCache, error::ErrorCode};

    use super::*;

    fn package(id: PackageId) -> Package {
        Package {
            id,
            name: format!("Package {id}"),
            description: String::new(),
            package_type: "single".to_string(),
            base_price: Decimal::new(999, 2),
            sales_tax: Decimal::ZERO,
            total_price: Decimal::new(999, 2),
            currency: "GBP".to_string(),
            discount: Decimal::ZERO,
            image: None,
        }
    }

    fn catalog(api: MockCatalogApi) -> (Catalog, Arc<MemoryCache<CatalogEntry>>) {
        let cache = Arc::new(MemoryCache::new());

        let catalog = Catalog::new(
            Arc::new(api),
            Arc::clone(&cache) as Arc<dyn Cache<CatalogEntry>>,
            "store",
            RetryPolicy::new(3, 0, 0),
        );

        (catalog, cache)
    }

    #[tokio::test]
    async fn repeated_query_is_served_from_cache() -> TestResult {
        let mut api = MockCatalogApi::new();

        api.expect_get_package()
            .once()
            .withf(|id| *id == 101)
            .return_once(|_| Ok(package(101)));

        let (catalog, _) = catalog(api);

        assert_eq!(catalog.package(101).await?.id, 101);
        assert_eq!(catalog.package(101).await?.id, 101);

        Ok(())
    }

    #[tokio::test]
    async fn invalidated_query_is_fetched_again() -> TestResult {
        let mut api = MockCatalogApi::new();

        api.expect_get_packages()
            .times(2)
            .returning(|| Ok(vec![package(101), package(201)]));

        let (catalog, cache) = catalog(api);

        catalog.packages().await?;
        catalog.invalidate_all();

        assert!(
            cache.is_stale(&keys::packages("store")),
            "listing should be stale after invalidate_all"
        );
        assert_eq!(catalog.packages().await?.len(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn transient_failures_are_retried() -> TestResult {
        let mut api = MockCatalogApi::new();
        let mut sequence = mockall::Sequence::new();

        api.expect_get_webstore()
            .once()
            .in_sequence(&mut sequence)
            .return_once(|| Err(TebexError::new(ErrorCode::NetworkError, "Failed to fetch").into()));

        api.expect_get_webstore()
            .once()
            .in_sequence(&mut sequence)
            .return_once(|| {
                Ok(Webstore {
                    id: 1,
                    name: "Shop".to_string(),
                    description: String::new(),
                    webstore_url: "https://shop.tebex.io".to_string(),
                    currency: "GBP".to_string(),
                    lang: "en".to_string(),
                    logo: None,
                    platform_type: "Minecraft: Java Edition".to_string(),
                })
            });

        let (catalog, _) = catalog(api);

        assert_eq!(catalog.webstore().await?.name, "Shop");

        Ok(())
    }

    #[tokio::test]
    async fn missing_category_is_classified_and_not_retried() {
        let mut api = MockCatalogApi::new();

        api.expect_get_category().once().return_once(|_| {
            Err(ApiError::Status {
                status: 404,
                message: "Category not found".to_string(),
            })
        });

        let (catalog, cache) = catalog(api);

        let result = catalog.category(7).await;

        assert_eq!(
            result.map_err(|error| error.code),
            Err(ErrorCode::CategoryNotFound)
        );
        assert!(cache.is_empty(), "failed query should not be cached");
    }
}
