//! Cart synchronization over the `cart` collection.
//!
//! Each user's lines are cached after the first fetch. Writes go straight to
//! the backend; only once a write succeeds is the cached view dropped and
//! refetched, so a failed write leaves what the shopper sees unchanged.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use rust_decimal::Decimal;
use tracing::{debug, instrument, warn};

use atelier_core::{CartLineId, CurrencyCode, Price, ProductId, Quantity, UserId};

use crate::backend::{CartLine, CartLineUpdate, CartStore, NewCartLine, Principal};

use super::ServiceError;

/// Flat shipping charged on any non-empty cart.
pub const FLAT_SHIPPING: Decimal = Decimal::from_parts(50, 0, 0, false, 0);

/// What adding an item that is already in the cart (same product, size, and
/// color) does to that line's quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddPolicy {
    /// The line's quantity becomes the quantity being added.
    #[default]
    Replace,
    /// The quantity being added is summed onto the line.
    Increment,
}

impl FromStr for AddPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "increment" => Ok(Self::Increment),
            other => Err(format!("unknown cart add policy: {other}")),
        }
    }
}

/// An item to put in the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItem {
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub size: Option<String>,
    pub color: Option<String>,
}

impl CartItem {
    #[must_use]
    pub const fn new(product_id: ProductId, quantity: Quantity) -> Self {
        Self {
            product_id,
            quantity,
            size: None,
            color: None,
        }
    }

    #[must_use]
    pub fn with_size(mut self, size: Option<String>) -> Self {
        self.size = size.filter(|s| !s.is_empty());
        self
    }

    #[must_use]
    pub fn with_color(mut self, color: Option<String>) -> Self {
        self.color = color.filter(|c| !c.is_empty());
        self
    }
}

/// Totals shown in the cart sidebar and on the cart page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSummary {
    pub item_count: u32,
    pub subtotal: Price,
    pub shipping: Price,
    pub total: Price,
}

impl CartSummary {
    /// Lines whose product is no longer available are left out.
    #[must_use]
    pub fn from_lines(lines: &[CartLine]) -> Self {
        let currency = CurrencyCode::default();
        let line_totals: Vec<Price> = lines.iter().filter_map(CartLine::line_total).collect();
        let subtotal = Price::sum(currency, &line_totals).unwrap_or_else(|| {
            warn!("Cart lines priced in another currency were left out");
            Price::sum(
                currency,
                line_totals.iter().filter(|p| p.currency_code == currency),
            )
            .unwrap_or(Price::zero(currency))
        });
        let shipping = if subtotal.amount > Decimal::ZERO {
            Price::new(FLAT_SHIPPING, currency)
        } else {
            Price::zero(currency)
        };

        Self {
            item_count: count(lines),
            subtotal,
            shipping,
            total: subtotal.checked_add(&shipping).unwrap_or(subtotal),
        }
    }
}

/// Number of items in the cart: the sum of line quantities, saturating
/// rather than wrapping.
#[must_use]
pub fn count(lines: &[CartLine]) -> u32 {
    lines
        .iter()
        .fold(0_u32, |acc, l| acc.saturating_add(l.quantity.get()))
}

/// Cached cart view per user.
#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn CartStore>,
    cache: Cache<UserId, Arc<Vec<CartLine>>>,
    policy: AddPolicy,
}

impl CartService {
    #[must_use]
    pub fn new(store: Arc<dyn CartStore>, policy: AddPolicy) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_idle(Duration::from_secs(30 * 60))
            .build();
        Self {
            store,
            cache,
            policy,
        }
    }

    /// The shopper's cart lines joined with product data. Anonymous shoppers
    /// have an empty cart and cost no backend call.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails. Nothing is retried.
    #[instrument(skip(self), fields(user_id = ?principal.map(|p| p.user_id)))]
    pub async fn fetch(
        &self,
        principal: Option<&Principal>,
    ) -> Result<Arc<Vec<CartLine>>, ServiceError> {
        let Some(principal) = principal else {
            return Ok(Arc::default());
        };

        if let Some(lines) = self.cache.get(&principal.user_id).await {
            debug!("Cache hit for cart");
            return Ok(lines);
        }

        let lines = Arc::new(self.store.cart_lines(principal).await?);
        self.cache
            .insert(principal.user_id, Arc::clone(&lines))
            .await;
        Ok(lines)
    }

    /// Put an item in the cart. With [`AddPolicy::Replace`] an existing line
    /// for the same (product, size, color) takes the new quantity; it is
    /// never summed. Use [`CartService::update`] to change a quantity.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self, item), fields(user_id = %principal.user_id, product_id = %item.product_id))]
    pub async fn add(
        &self,
        principal: &Principal,
        item: CartItem,
    ) -> Result<Arc<Vec<CartLine>>, ServiceError> {
        let quantity = match self.policy {
            AddPolicy::Replace => item.quantity,
            AddPolicy::Increment => {
                let lines = self.fetch(Some(principal)).await?;
                let existing = lines
                    .iter()
                    .find(|l| {
                        l.same_slot(item.product_id, item.size.as_deref(), item.color.as_deref())
                    })
                    .map_or(0, |l| l.quantity.get());
                Quantity::saturating(existing.saturating_add(item.quantity.get()))?
            }
        };

        let line = NewCartLine {
            user_id: principal.user_id,
            product_id: item.product_id,
            quantity,
            size: item.size,
            color: item.color,
        };
        self.store.upsert_cart_line(principal, &line).await?;
        self.refresh(principal).await
    }

    /// Change fields of a line.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self, changes), fields(user_id = %principal.user_id, line_id = %id))]
    pub async fn update(
        &self,
        principal: &Principal,
        id: CartLineId,
        changes: CartLineUpdate,
    ) -> Result<Arc<Vec<CartLine>>, ServiceError> {
        if changes.is_empty() {
            return self.fetch(Some(principal)).await;
        }
        self.store.update_cart_line(principal, id, &changes).await?;
        self.refresh(principal).await
    }

    /// Set a line's quantity.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuantity` for zero, or an error if the backend
    /// request fails.
    pub async fn set_quantity(
        &self,
        principal: &Principal,
        id: CartLineId,
        quantity: u32,
    ) -> Result<Arc<Vec<CartLine>>, ServiceError> {
        let quantity = Quantity::new(quantity)?;
        self.update(principal, id, CartLineUpdate::quantity(quantity))
            .await
    }

    /// Remove a line. Removing a line that is already gone succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self), fields(user_id = %principal.user_id, line_id = %id))]
    pub async fn remove(
        &self,
        principal: &Principal,
        id: CartLineId,
    ) -> Result<Arc<Vec<CartLine>>, ServiceError> {
        self.store.delete_cart_line(principal, id).await?;
        self.refresh(principal).await
    }

    /// Remove every line.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self), fields(user_id = %principal.user_id))]
    pub async fn clear(&self, principal: &Principal) -> Result<(), ServiceError> {
        self.store.clear_cart(principal).await?;
        self.cache
            .insert(principal.user_id, Arc::default())
            .await;
        Ok(())
    }

    /// Drop the cached view for a user (sign-out).
    pub async fn invalidate(&self, user_id: UserId) {
        self.cache.invalidate(&user_id).await;
    }

    async fn refresh(&self, principal: &Principal) -> Result<Arc<Vec<CartLine>>, ServiceError> {
        self.cache.invalidate(&principal.user_id).await;
        self.fetch(Some(principal)).await
    }
}
