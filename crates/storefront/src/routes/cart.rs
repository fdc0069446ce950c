//! Cart route handlers.
//!
//! Every cart change is a form post answered with a redirect. The cart page
//! also shows the wishlist and the checkout form.

use std::str::FromStr;

use askama::Template;
use askama_web::WebTemplate;
use axum::{Form, extract::State, response::Redirect};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{debug, instrument, warn};

use atelier_core::{AddressId, CartLineId, PaymentMethod, ProductId, Quantity};

use crate::backend::{BackendError, CartLine, PLACEHOLDER_IMAGE, Product, WishlistEntry};
use crate::error::{AppError, add_breadcrumb};
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::Flash;
use crate::routes::address::load_book;
use crate::routes::{Layout, redirect_back};
use crate::services::{
    AddressBook, CartItem, CartSummary, Checkout, CheckoutItem, ServiceError, quantity_message,
};
use crate::state::AppState;

// =============================================================================
// Views
// =============================================================================

/// Cart line display data for templates.
pub struct CartLineView {
    pub id: CartLineId,
    pub product_id: ProductId,
    pub name: String,
    pub image: String,
    pub size: Option<String>,
    pub color: Option<String>,
    pub quantity: u32,
    pub unit_price: String,
    pub line_total: String,
    /// The product was withdrawn since the line was added.
    pub unavailable: bool,
}

impl From<&CartLine> for CartLineView {
    fn from(line: &CartLine) -> Self {
        let product = line.product.as_ref();
        Self {
            id: line.id,
            product_id: line.product_id,
            name: product.map_or_else(|| "Unavailable item".to_string(), |p| p.name.clone()),
            image: product
                .map_or(PLACEHOLDER_IMAGE, Product::primary_image)
                .to_string(),
            size: line.size.clone(),
            color: line.color.clone(),
            quantity: line.quantity.get(),
            unit_price: product.map(|p| p.unit_price().display()).unwrap_or_default(),
            line_total: line.line_total().map(|p| p.display()).unwrap_or_default(),
            unavailable: product.is_none(),
        }
    }
}

/// Wishlist entry display data for templates.
pub struct WishlistItemView {
    pub product_id: ProductId,
    pub name: String,
    pub image: String,
    pub price: String,
    pub sizes: Vec<String>,
}

impl WishlistItemView {
    fn from_entry(entry: &WishlistEntry) -> Option<Self> {
        entry.product.as_ref().map(|product| Self {
            product_id: entry.product_id,
            name: product.name.clone(),
            image: product.primary_image().to_string(),
            price: product.unit_price().display(),
            sizes: product.sizes.clone(),
        })
    }
}

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartTemplate {
    pub layout: Layout,
    pub lines: Vec<CartLineView>,
    pub summary: CartSummary,
    pub wishlist: Vec<WishlistItemView>,
    pub addresses: AddressBook,
    pub payment_methods: [PaymentMethod; 4],
}

// =============================================================================
// Forms
// =============================================================================

/// Add to cart form data.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub product_id: String,
    pub quantity: Option<u32>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub redirect_to: Option<String>,
}

/// Update quantity form data.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub line_id: CartLineId,
    pub quantity: u32,
}

/// Remove line form data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub line_id: CartLineId,
}

/// Checkout form data.
#[derive(Debug, Deserialize)]
pub struct CheckoutForm {
    /// Delivery address; the book's default when absent.
    pub address_id: Option<String>,
    /// Billing address when it differs from delivery.
    pub billing_address_id: Option<String>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

/// Queue a notification and return to the page the form came from.
async fn flash_back(session: &Session, flash: Flash, redirect_to: Option<&str>) -> Redirect {
    flash.push(session).await;
    redirect_back(redirect_to, "/cart")
}

/// Check the chosen options against the product.
fn cart_item(product: &Product, form: &AddToCartForm) -> Result<CartItem, &'static str> {
    let size = form.size.as_deref().map(str::trim).filter(|s| !s.is_empty());
    if product.requires_size() {
        match size {
            None => return Err("Please select a size"),
            Some(size) if !product.sizes.iter().any(|s| s == size) => {
                return Err("Please select a valid size");
            }
            Some(_) => {}
        }
    }
    if !product.in_stock() {
        return Err("This product is out of stock");
    }
    let quantity = Quantity::new(form.quantity.unwrap_or(1)).map_err(quantity_message)?;

    Ok(CartItem::new(product.id, quantity)
        .with_size(size.map(String::from))
        .with_color(form.color.clone()))
}

fn parse_id<T: FromStr>(value: Option<&str>) -> Option<T> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse().ok())
}

// =============================================================================
// Handlers
// =============================================================================

/// Display the cart page.
///
/// # Errors
///
/// Returns an error if the cart cannot be loaded.
#[instrument(skip(state, session, user))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
) -> Result<CartTemplate, AppError> {
    let principal = user.principal();
    let lines = state.cart().fetch(Some(&principal)).await?;
    let wishlist = match state.wishlist().fetch(Some(&principal)).await {
        Ok(entries) => entries
            .iter()
            .filter_map(WishlistItemView::from_entry)
            .collect(),
        Err(e) => {
            warn!(error = %e, "Failed to load wishlist for cart page");
            Vec::new()
        }
    };

    Ok(CartTemplate {
        summary: CartSummary::from_lines(&lines),
        lines: lines.iter().map(CartLineView::from).collect(),
        wishlist,
        addresses: load_book(&session).await,
        payment_methods: PaymentMethod::ALL,
        layout: Layout::load(&state, &session, Some(&user)).await,
    })
}

/// Add an item to the cart.
///
/// Products with size options need a size. Adding a (product, size, color)
/// that is already in the cart follows the configured add policy.
///
/// # Errors
///
/// Returns an error for a malformed product id or if the catalog cannot be
/// reached.
#[instrument(skip(state, session, user, form), fields(product_id = %form.product_id))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Form(form): Form<AddToCartForm>,
) -> Result<Redirect, AppError> {
    let back = form.redirect_to.as_deref();

    let product_id: ProductId = form
        .product_id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid product".to_string()))?;
    let product = match state.catalog().product(product_id).await {
        Ok(product) => product,
        Err(ServiceError::Backend(BackendError::NotFound(_))) => {
            let flash = Flash::error("This product is no longer available");
            return Ok(flash_back(&session, flash, back).await);
        }
        Err(e) => return Err(e.into()),
    };

    let item = match cart_item(&product, &form) {
        Ok(item) => item,
        Err(message) => return Ok(flash_back(&session, Flash::error(message), back).await),
    };

    let flash = match state.cart().add(&user.principal(), item).await {
        Ok(_) => {
            add_breadcrumb("cart", "Added to cart", &[("product", &product.name)]);
            Flash::success(format!("{} added to cart", product.name))
        }
        Err(e) => {
            warn!(error = %e, "Add to cart failed");
            Flash::error(e.user_message())
        }
    };
    Ok(flash_back(&session, flash, back).await)
}

/// Change a line's quantity.
#[instrument(skip(state, session, user))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Form(form): Form<UpdateCartForm>,
) -> Redirect {
    if let Err(e) = state
        .cart()
        .set_quantity(&user.principal(), form.line_id, form.quantity)
        .await
    {
        warn!(error = %e, "Cart update failed");
        Flash::error(e.user_message()).push(&session).await;
    }
    Redirect::to("/cart")
}

/// Remove a line.
#[instrument(skip(state, session, user))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Form(form): Form<RemoveFromCartForm>,
) -> Redirect {
    match state.cart().remove(&user.principal(), form.line_id).await {
        Ok(_) => Flash::info("Item removed from cart").push(&session).await,
        Err(e) => {
            warn!(error = %e, "Cart remove failed");
            Flash::error(e.user_message()).push(&session).await;
        }
    }
    Redirect::to("/cart")
}

/// Empty the cart.
#[instrument(skip(state, session, user))]
pub async fn clear(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
) -> Redirect {
    match state.cart().clear(&user.principal()).await {
        Ok(()) => Flash::info("Cart cleared").push(&session).await,
        Err(e) => {
            warn!(error = %e, "Cart clear failed");
            Flash::error(e.user_message()).push(&session).await;
        }
    }
    Redirect::to("/cart")
}

/// Place an order from the cart.
///
/// Prices are taken from the cart lines as loaded here. On success the cart
/// is emptied and the shopper lands on the order's tracking page.
///
/// # Errors
///
/// Returns an error if the cart cannot be loaded.
#[instrument(skip(state, session, user, form))]
pub async fn checkout(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Form(form): Form<CheckoutForm>,
) -> Result<Redirect, AppError> {
    let principal = user.principal();
    let lines = state.cart().fetch(Some(&principal)).await?;
    let items: Vec<CheckoutItem> = lines
        .iter()
        .filter_map(CheckoutItem::from_cart_line)
        .collect();
    if items.is_empty() {
        Flash::error("Your cart is empty").push(&session).await;
        return Ok(Redirect::to("/cart"));
    }

    let book = load_book(&session).await;
    let shipping = parse_id::<AddressId>(form.address_id.as_deref())
        .and_then(|id| book.get(id))
        .or_else(|| book.default_entry());
    let Some(shipping) = shipping else {
        Flash::error("Please add a delivery address")
            .push(&session)
            .await;
        return Ok(Redirect::to("/address"));
    };
    let billing = parse_id::<AddressId>(form.billing_address_id.as_deref())
        .filter(|id| *id != shipping.id)
        .and_then(|id| book.get(id))
        .map(|entry| entry.address.clone());

    let checkout = Checkout {
        items,
        shipping_address: shipping.address.clone(),
        billing_address: billing,
        payment_method: form.payment_method,
    };

    match state.orders().place_order(&principal, checkout).await {
        Ok(order) => {
            if let Err(e) = state.cart().clear(&principal).await {
                warn!(error = %e, order_number = %order.order_number, "Failed to clear cart after order");
            }
            add_breadcrumb(
                "checkout",
                "Order placed",
                &[("order_number", &order.order_number)],
            );
            Flash::success(format!("Order {} placed", order.order_number))
                .push(&session)
                .await;
            Ok(Redirect::to(&format!(
                "/track-order?order={}",
                urlencoding::encode(&order.order_number)
            )))
        }
        Err(e) => {
            // The order service has already logged the failure
            debug!(error = %e, "Checkout failed");
            Flash::error(e.user_message()).push(&session).await;
            Ok(Redirect::to("/cart"))
        }
    }
}
