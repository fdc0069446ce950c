//! Home page route handler.

use std::sync::Arc;

use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};
use tower_sessions::Session;
use tracing::{instrument, warn};

use crate::backend::{Category, Product};
use crate::filters;
use crate::middleware::OptionalAuth;
use crate::routes::Layout;
use crate::services::WishlistSnapshot;
use crate::state::AppState;

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub layout: Layout,
    pub featured: Arc<Vec<Product>>,
    pub categories: Arc<Vec<Category>>,
    pub wishlist: WishlistSnapshot,
}

/// Display the home page.
///
/// Catalog failures render an empty section instead of an error page.
#[instrument(skip(state, session, user))]
pub async fn home(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> impl IntoResponse {
    let principal = user.as_ref().map(crate::models::CurrentUser::principal);

    let featured = state.catalog().featured().await.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load featured products");
        Arc::default()
    });
    let categories = state.catalog().categories().await.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load categories");
        Arc::default()
    });
    let wishlist = state
        .wishlist()
        .snapshot(principal.as_ref())
        .await
        .unwrap_or_default();

    HomeTemplate {
        layout: Layout::load(&state, &session, user.as_ref()).await,
        featured,
        categories,
        wishlist,
    }
}
