//! Product catalog reads.
//!
//! Products and categories are read-only from the storefront's side, so
//! listings are cached for 5 minutes. Free-text searches are not cached.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use rust_decimal::Decimal;
use tracing::{debug, instrument};

use atelier_core::{CurrencyCode, Price, ProductId};

use crate::backend::{CatalogStore, Category, Product, ProductQuery};

use super::ServiceError;

/// Products shown on the home page.
pub const FEATURED_LIMIT: usize = 8;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    Product(ProductId),
    Products(ProductQuery),
    Categories,
}

#[derive(Debug, Clone)]
enum CacheValue {
    Product(Box<Product>),
    Products(Arc<Vec<Product>>),
    Categories(Arc<Vec<Category>>),
}

/// Listing filters from the `/products` page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub sizes: Vec<String>,
    pub colors: Vec<String>,
}

impl ProductFilter {
    /// Whether any filter narrows the listing.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.search.is_some()
            || self.min_price.is_some()
            || self.max_price.is_some()
            || !self.sizes.is_empty()
            || !self.colors.is_empty()
    }
}

impl From<ProductFilter> for ProductQuery {
    fn from(filter: ProductFilter) -> Self {
        Self {
            search: filter
                .search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            min_price: filter.min_price,
            max_price: filter.max_price,
            sizes: filter.sizes,
            colors: filter.colors,
            ..Self::default()
        }
    }
}

/// Delivery estimate for a pincode on the product page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryQuote {
    Available {
        min_days: u32,
        max_days: u32,
        /// `None` when delivery is free.
        charge: Option<Price>,
    },
    Unserviceable,
}

impl DeliveryQuote {
    /// Quote for a six-digit pincode: 3-5 days, free for pincodes starting
    /// with `1`, ₹99 otherwise.
    #[must_use]
    pub fn for_pincode(pincode: &str) -> Self {
        let pincode = pincode.trim();
        if pincode.len() != 6 || !pincode.bytes().all(|b| b.is_ascii_digit()) {
            return Self::Unserviceable;
        }
        let charge = (!pincode.starts_with('1'))
            .then(|| Price::new(Decimal::from(99), CurrencyCode::INR));
        Self::Available {
            min_days: 3,
            max_days: 5,
            charge,
        }
    }

    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Available {
                min_days,
                max_days,
                charge,
            } => {
                let charge = charge
                    .as_ref()
                    .map_or_else(|| "Free delivery".to_string(), |c| format!("Delivery {c}"));
                format!("Delivery in {min_days}-{max_days} days. {charge}")
            }
            Self::Unserviceable => "Sorry, we don't deliver to this pincode yet".to_string(),
        }
    }
}

/// Cached product and category reads.
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
    cache: Cache<CacheKey, CacheValue>,
}

impl CatalogService {
    #[must_use]
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();
        Self { store, cache }
    }

    /// Featured active products for the home page.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    pub async fn featured(&self) -> Result<Arc<Vec<Product>>, ServiceError> {
        self.list(ProductQuery::featured(FEATURED_LIMIT)).await
    }

    /// Active products in a category (`men`, `women`, ...).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    pub async fn by_category(&self, slug: &str) -> Result<Arc<Vec<Product>>, ServiceError> {
        self.list(ProductQuery::category(slug)).await
    }

    /// Filtered listing, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    pub async fn search(&self, filter: ProductFilter) -> Result<Arc<Vec<Product>>, ServiceError> {
        self.list(filter.into()).await
    }

    #[instrument(skip(self))]
    async fn list(&self, query: ProductQuery) -> Result<Arc<Vec<Product>>, ServiceError> {
        let cacheable = query.search.is_none();
        let key = CacheKey::Products(query.clone());

        if cacheable && let Some(CacheValue::Products(products)) = self.cache.get(&key).await {
            debug!("Cache hit for products");
            return Ok(products);
        }

        let products = Arc::new(self.store.list_products(&query).await?);

        if cacheable {
            self.cache
                .insert(key, CacheValue::Products(Arc::clone(&products)))
                .await;
        }

        Ok(products)
    }

    /// A single active product.
    ///
    /// # Errors
    ///
    /// Returns `Backend(NotFound)` for unknown or inactive products.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn product(&self, id: ProductId) -> Result<Product, ServiceError> {
        let key = CacheKey::Product(id);
        if let Some(CacheValue::Product(product)) = self.cache.get(&key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let product = self.store.get_product(id).await?;
        self.cache
            .insert(key, CacheValue::Product(Box::new(product.clone())))
            .await;
        Ok(product)
    }

    /// All categories by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Arc<Vec<Category>>, ServiceError> {
        if let Some(CacheValue::Categories(categories)) =
            self.cache.get(&CacheKey::Categories).await
        {
            return Ok(categories);
        }

        let categories = Arc::new(self.store.list_categories().await?);
        self.cache
            .insert(
                CacheKey::Categories,
                CacheValue::Categories(Arc::clone(&categories)),
            )
            .await;
        Ok(categories)
    }
}
