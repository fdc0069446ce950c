//! Order history and tracking.

use askama::Template;
use askama_web::WebTemplate;
use axum::extract::{Query, State};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::backend::Order;
use crate::error::AppError;
use crate::filters;
use crate::middleware::RequireAuth;
use crate::routes::Layout;
use crate::state::AppState;

/// `/track-order` query string.
#[derive(Debug, Default, Deserialize)]
pub struct TrackQuery {
    pub order: Option<String>,
}

/// Order tracking page template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/track.html")]
pub struct TrackTemplate {
    pub layout: Layout,
    /// The number that was looked up, echoed into the search box.
    pub query: String,
    /// The looked-up order; `None` with a non-empty query means not found.
    pub selected: Option<Order>,
    pub orders: Vec<Order>,
}

/// Order history, with one order's timeline when `?order=` is given.
///
/// # Errors
///
/// Returns an error if the orders cannot be loaded.
#[instrument(skip(state, session, user))]
pub async fn track(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Query(query): Query<TrackQuery>,
) -> Result<TrackTemplate, AppError> {
    let principal = user.principal();
    let number = query.order.unwrap_or_default().trim().to_string();

    let orders = state.orders().orders(&principal).await?;
    let selected = if number.is_empty() {
        None
    } else {
        state.orders().track(&principal, &number).await?
    };

    Ok(TrackTemplate {
        layout: Layout::load(&state, &session, Some(&user)).await,
        query: number,
        selected,
        orders,
    })
}
