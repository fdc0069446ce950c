//! Wishlist route handlers.
//!
//! A second change to the same product while the first is still saving is
//! answered with a notice instead of being queued.

use axum::{Form, extract::State, response::Redirect};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{instrument, warn};

use atelier_core::ProductId;

use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::models::Flash;
use crate::routes::redirect_back;
use crate::services::{ServiceError, Toggled};
use crate::state::AppState;

/// Wishlist form data, shared by every wishlist action.
#[derive(Debug, Deserialize)]
pub struct WishlistForm {
    pub product_id: String,
    /// Chosen size, only read by move-to-cart.
    pub size: Option<String>,
    pub redirect_to: Option<String>,
}

impl WishlistForm {
    fn product_id(&self) -> Result<ProductId, AppError> {
        self.product_id
            .parse()
            .map_err(|_| AppError::BadRequest("Invalid product".to_string()))
    }

    fn back(&self, default: &str) -> Redirect {
        redirect_back(self.redirect_to.as_deref(), default)
    }
}

fn failure(error: &ServiceError) -> Flash {
    match error {
        ServiceError::Busy(_) => Flash::info(error.user_message()),
        _ => {
            warn!(error = %error, "Wishlist change failed");
            Flash::error(error.user_message())
        }
    }
}

/// Add the product if absent, remove it if present.
///
/// # Errors
///
/// Returns an error for a malformed product id.
#[instrument(skip(state, session, user, form), fields(product_id = %form.product_id))]
pub async fn toggle(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Form(form): Form<WishlistForm>,
) -> Result<Redirect, AppError> {
    let product_id = form.product_id()?;
    let flash = match state.wishlist().toggle(&user.principal(), product_id).await {
        Ok(Toggled::Added) => Flash::success("Added to wishlist"),
        Ok(Toggled::Removed) => Flash::info("Removed from wishlist"),
        Err(e) => failure(&e),
    };
    flash.push(&session).await;
    Ok(form.back("/"))
}

/// Remove the product.
///
/// # Errors
///
/// Returns an error for a malformed product id.
#[instrument(skip(state, session, user, form), fields(product_id = %form.product_id))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Form(form): Form<WishlistForm>,
) -> Result<Redirect, AppError> {
    let product_id = form.product_id()?;
    let flash = match state.wishlist().remove(&user.principal(), product_id).await {
        Ok(_) => Flash::info("Removed from wishlist"),
        Err(e) => failure(&e),
    };
    flash.push(&session).await;
    Ok(form.back("/cart"))
}

/// Put one of the product in the cart and take it off the wishlist.
///
/// # Errors
///
/// Returns an error for a malformed product id.
#[instrument(skip(state, session, user, form), fields(product_id = %form.product_id))]
pub async fn move_to_cart(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Form(form): Form<WishlistForm>,
) -> Result<Redirect, AppError> {
    let product_id = form.product_id()?;
    let size = form.size.clone().filter(|s| !s.trim().is_empty());

    if size.is_none()
        && let Ok(product) = state.catalog().product(product_id).await
        && product.requires_size()
    {
        Flash::error("Please select a size").push(&session).await;
        return Ok(form.back("/cart"));
    }

    let flash = match state
        .wishlist()
        .move_to_cart(&user.principal(), product_id, size)
        .await
    {
        Ok(()) => Flash::success("Moved to cart"),
        Err(e) => failure(&e),
    };
    flash.push(&session).await;
    Ok(form.back("/cart"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::routes::tests::{Browser, body_text, location};

    #[tokio::test]
    async fn test_toggle_adds_then_removes() {
        let mut browser = Browser::new();
        browser.sign_in().await;
        let id = browser.app.shirt.id;

        let response = browser
            .post("/wishlist/toggle", &format!("product_id={id}&redirect_to=%2Fmen"))
            .await;
        assert_eq!(location(&response), "/men");
        let page = body_text(browser.get("/men").await).await;
        assert!(page.contains("Added to wishlist"));
        assert!(page.contains("heart heart-on"));

        browser
            .post("/wishlist/toggle", &format!("product_id={id}"))
            .await;
        let page = body_text(browser.get("/").await).await;
        assert!(page.contains("Removed from wishlist"));
    }

    #[tokio::test]
    async fn test_move_to_cart_needs_size_for_sized_product() {
        let mut browser = Browser::new();
        browser.sign_in().await;
        let id = browser.app.dress.id;
        browser
            .post("/wishlist/toggle", &format!("product_id={id}"))
            .await;

        browser
            .post("/wishlist/move-to-cart", &format!("product_id={id}"))
            .await;
        assert!(browser.app.backend.cart_rows().is_empty());

        let response = browser
            .post("/wishlist/move-to-cart", &format!("product_id={id}&size=M"))
            .await;
        assert_eq!(location(&response), "/cart");
        let rows = browser.app.backend.cart_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].size.as_deref(), Some("M"));

        let page = body_text(browser.get("/cart").await).await;
        assert!(page.contains("Moved to cart"));
    }

    #[tokio::test]
    async fn test_malformed_product_id_is_bad_request() {
        let mut browser = Browser::new();
        browser.sign_in().await;
        let response = browser.post("/wishlist/toggle", "product_id=nope").await;
        assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
