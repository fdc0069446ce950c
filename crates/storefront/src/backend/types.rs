//! Row and payload types exchanged with the hosted backend.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use atelier_core::{
    CartLineId, CategoryId, CurrencyCode, OrderId, OrderLineId, OrderStatus, PaymentMethod, Price,
    ProductId, Quantity, ShippingAddress, UserId, WishlistEntryId,
};

/// Shown when a product has no images.
pub const PLACEHOLDER_IMAGE: &str = "/static/img/placeholder.svg";

/// Array columns come back as `null` when unset.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Cart options are stored as `''` when absent: `NULL`s never collide in
/// the (user, product, size, color) unique key, so an upsert would insert a
/// second row instead of merging.
fn none_as_blank<S: Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(value.as_deref().unwrap_or_default())
}

/// Reads `''` and `null` alike as an absent cart option.
fn blank_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.filter(|v| !v.is_empty()))
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub sale_price: Option<Decimal>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub images: Vec<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub stock_quantity: i32,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sizes: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub colors: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    pub created_at: DateTime<Utc>,
    /// Embedded `categories(*)` relation when selected.
    #[serde(default, rename = "categories", skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

const fn default_true() -> bool {
    true
}

impl Product {
    /// Sale price when set, list price otherwise.
    #[must_use]
    pub fn unit_amount(&self) -> Decimal {
        self.sale_price.unwrap_or(self.price)
    }

    #[must_use]
    pub fn unit_price(&self) -> Price {
        Price::new(self.unit_amount(), CurrencyCode::default())
    }

    #[must_use]
    pub fn list_price(&self) -> Price {
        Price::new(self.price, CurrencyCode::default())
    }

    #[must_use]
    pub fn is_on_sale(&self) -> bool {
        self.sale_price.is_some_and(|sale| sale < self.price)
    }

    /// Whole-number discount percentage when on sale.
    #[must_use]
    pub fn discount_percent(&self) -> Option<u32> {
        use rust_decimal::prelude::ToPrimitive;

        let sale = self.sale_price.filter(|_| self.is_on_sale())?;
        if self.price.is_zero() {
            return None;
        }
        ((self.price - sale) / self.price * Decimal::ONE_HUNDRED)
            .round()
            .to_u32()
    }

    /// All images, the legacy single `image_url` first.
    #[must_use]
    pub fn gallery(&self) -> Vec<&str> {
        let mut gallery: Vec<&str> = self.image_url.iter().map(String::as_str).collect();
        gallery.extend(
            self.images
                .iter()
                .map(String::as_str)
                .filter(|img| Some(*img) != self.image_url.as_deref()),
        );
        gallery
    }

    #[must_use]
    pub fn primary_image(&self) -> &str {
        self.image_url
            .as_deref()
            .or_else(|| self.images.first().map(String::as_str))
            .unwrap_or(PLACEHOLDER_IMAGE)
    }

    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.stock_quantity > 0
    }

    /// Products with size options need one chosen before adding to cart.
    #[must_use]
    pub fn requires_size(&self) -> bool {
        !self.sizes.is_empty()
    }
}

/// Filters for a product listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProductQuery {
    pub category_slug: Option<String>,
    pub featured_only: bool,
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub sizes: Vec<String>,
    pub colors: Vec<String>,
    pub limit: Option<usize>,
}

impl ProductQuery {
    #[must_use]
    pub fn featured(limit: usize) -> Self {
        Self {
            featured_only: true,
            limit: Some(limit),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn category(slug: &str) -> Self {
        Self {
            category_slug: Some(slug.to_string()),
            ..Self::default()
        }
    }

    /// Whether a product satisfies every filter (used by the in-memory store
    /// and to double-check embedded results).
    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        if !product.is_active || (self.featured_only && !product.is_featured) {
            return false;
        }
        if self
            .category_slug
            .as_ref()
            .is_some_and(|slug| product.category.as_ref().is_none_or(|c| &c.slug != slug))
        {
            return false;
        }
        if let Some(needle) = &self.search {
            let needle = needle.to_lowercase();
            let in_name = product.name.to_lowercase().contains(&needle);
            let in_description = product
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle));
            if !in_name && !in_description {
                return false;
            }
        }
        if self.min_price.is_some_and(|min| product.price < min)
            || self.max_price.is_some_and(|max| product.price > max)
        {
            return false;
        }
        let overlaps = |wanted: &[String], have: &[String]| {
            wanted.is_empty() || wanted.iter().any(|w| have.contains(w))
        };
        overlaps(&self.sizes, &product.sizes) && overlaps(&self.colors, &product.colors)
    }
}

// =============================================================================
// Cart
// =============================================================================

/// A persisted cart row with its product embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: CartLineId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub size: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
    /// `null` when the product has since been deactivated.
    #[serde(default, rename = "products")]
    pub product: Option<Product>,
}

impl CartLine {
    /// Unit price times quantity, if the product is still available.
    #[must_use]
    pub fn line_total(&self) -> Option<Price> {
        self.product
            .as_ref()
            .map(|p| p.unit_price().times(self.quantity))
    }

    /// Whether this line occupies the same slot as the given key.
    #[must_use]
    pub fn same_slot(&self, product_id: ProductId, size: Option<&str>, color: Option<&str>) -> bool {
        self.product_id == product_id
            && self.size.as_deref() == size
            && self.color.as_deref() == color
    }
}

/// Payload for inserting or replacing a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCartLine {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    #[serde(serialize_with = "none_as_blank")]
    pub size: Option<String>,
    #[serde(serialize_with = "none_as_blank")]
    pub color: Option<String>,
}

/// Partial update of a cart line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CartLineUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Quantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl CartLineUpdate {
    #[must_use]
    pub fn quantity(quantity: Quantity) -> Self {
        Self {
            quantity: Some(quantity),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.quantity.is_none() && self.size.is_none() && self.color.is_none()
    }
}

// =============================================================================
// Wishlist
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WishlistEntry {
    pub id: WishlistEntryId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub created_at: DateTime<Utc>,
    #[serde(default, rename = "products")]
    pub product: Option<Product>,
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub order_number: String,
    pub total_amount: Decimal,
    #[serde(default)]
    pub status: OrderStatus,
    pub shipping_address: ShippingAddress,
    #[serde(default)]
    pub billing_address: Option<ShippingAddress>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    pub created_at: DateTime<Utc>,
    #[serde(default, rename = "order_items", skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<OrderLine>,
}

impl Order {
    #[must_use]
    pub fn total(&self) -> Price {
        Price::new(self.total_amount, CurrencyCode::default())
    }

    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity.get()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    /// Unit price captured at checkout.
    pub price: Decimal,
    #[serde(default, rename = "products", skip_serializing_if = "Option::is_none")]
    pub product: Option<Product>,
}

impl OrderLine {
    #[must_use]
    pub fn line_total(&self) -> Price {
        Price::new(self.price, CurrencyCode::default()).times(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewOrder {
    pub user_id: UserId,
    pub order_number: String,
    pub total_amount: Decimal,
    pub shipping_address: ShippingAddress,
    pub billing_address: Option<ShippingAddress>,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewOrderLine {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub size: Option<String>,
    pub color: Option<String>,
    pub price: Decimal,
}

// =============================================================================
// Auth
// =============================================================================

/// Social sign-in providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    Facebook,
}

impl OAuthProvider {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Facebook => "facebook",
        }
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Google => "Google",
            Self::Facebook => "Facebook",
        }
    }
}

impl std::str::FromStr for OAuthProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(Self::Google),
            "facebook" => Ok(Self::Facebook),
            other => Err(format!("unsupported provider: {other}")),
        }
    }
}

/// The authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub full_name: Option<String>,
}

impl AuthUser {
    /// Name for the header greeting.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.email.as_deref())
            .or(self.phone.as_deref())
            .unwrap_or("Account")
    }
}

/// Tokens plus user returned by any successful sign-in.
#[derive(Clone)]
pub struct AuthSession {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Result of an email sign-up.
#[derive(Debug, Clone)]
pub enum SignUpOutcome {
    /// Auto-confirmed: signed in immediately.
    SignedIn(AuthSession),
    /// A confirmation link was emailed.
    ConfirmationSent,
}
