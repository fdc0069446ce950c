//! Catalog route handlers: category pages, search, and product detail.

use std::sync::Arc;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use atelier_core::ProductId;

use crate::backend::{BackendError, Product};
use crate::error::AppError;
use crate::filters;
use crate::middleware::OptionalAuth;
use crate::models::CurrentUser;
use crate::routes::{Layout, NotFoundTemplate};
use crate::services::{DeliveryQuote, ProductFilter, ServiceError, WishlistSnapshot};
use crate::state::AppState;

/// Related products shown under a product.
const RELATED_LIMIT: usize = 4;

/// `/products` query string. Sizes and colors are comma-separated.
#[derive(Debug, Default, Deserialize)]
pub struct ListingQuery {
    pub search: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub sizes: Option<String>,
    pub colors: Option<String>,
}

fn parse_amount(value: Option<&str>) -> Option<Decimal> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse().ok())
        .filter(|amount: &Decimal| !amount.is_sign_negative())
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}

impl ListingQuery {
    /// Unparseable prices are ignored rather than rejected.
    fn to_filter(&self) -> ProductFilter {
        ProductFilter {
            search: self
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
            min_price: parse_amount(self.min_price.as_deref()),
            max_price: parse_amount(self.max_price.as_deref()),
            sizes: split_list(self.sizes.as_deref()),
            colors: split_list(self.colors.as_deref()),
        }
    }
}

/// Product listing template, shared by category and search pages.
#[derive(Template, WebTemplate)]
#[template(path = "catalog/listing.html")]
pub struct ListingTemplate {
    pub layout: Layout,
    pub title: String,
    pub path: &'static str,
    pub products: Arc<Vec<Product>>,
    pub wishlist: WishlistSnapshot,
    /// Present on `/products`, where the filter form is shown.
    pub filter: Option<ProductFilter>,
}

/// Product detail template.
#[derive(Template, WebTemplate)]
#[template(path = "catalog/product.html")]
pub struct ProductTemplate {
    pub layout: Layout,
    pub product: Product,
    pub related: Vec<Product>,
    pub wishlist: WishlistSnapshot,
    pub pincode: String,
    pub quote: Option<DeliveryQuote>,
}

/// Delivery check query string.
#[derive(Debug, Default, Deserialize)]
pub struct PincodeQuery {
    pub pincode: Option<String>,
}

async fn wishlist_snapshot(state: &AppState, user: Option<&CurrentUser>) -> WishlistSnapshot {
    let principal = user.map(CurrentUser::principal);
    state
        .wishlist()
        .snapshot(principal.as_ref())
        .await
        .unwrap_or_default()
}

async fn category_page(
    state: AppState,
    session: Session,
    user: Option<CurrentUser>,
    slug: &str,
    title: &str,
    path: &'static str,
) -> Result<ListingTemplate, AppError> {
    let products = state.catalog().by_category(slug).await?;
    Ok(ListingTemplate {
        wishlist: wishlist_snapshot(&state, user.as_ref()).await,
        layout: Layout::load(&state, &session, user.as_ref()).await,
        title: title.to_string(),
        path,
        products,
        filter: None,
    })
}

/// Men's collection.
///
/// # Errors
///
/// Returns an error if the catalog cannot be loaded.
#[instrument(skip(state, session, user))]
pub async fn men(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<ListingTemplate, AppError> {
    category_page(state, session, user, "men", "Men", "/men").await
}

/// Women's collection.
///
/// # Errors
///
/// Returns an error if the catalog cannot be loaded.
#[instrument(skip(state, session, user))]
pub async fn women(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<ListingTemplate, AppError> {
    category_page(state, session, user, "women", "Women", "/women").await
}

/// Search and filter listing.
///
/// # Errors
///
/// Returns an error if the catalog cannot be loaded.
#[instrument(skip(state, session, user))]
pub async fn index(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<ListingQuery>,
) -> Result<ListingTemplate, AppError> {
    let filter = query.to_filter();
    let products = state.catalog().search(filter.clone()).await?;
    let title = filter
        .search
        .as_ref()
        .map_or_else(|| "All Products".to_string(), |s| format!("Results for \"{s}\""));

    Ok(ListingTemplate {
        wishlist: wishlist_snapshot(&state, user.as_ref()).await,
        layout: Layout::load(&state, &session, user.as_ref()).await,
        title,
        path: "/products",
        products,
        filter: Some(filter),
    })
}

/// Product detail page, with an optional delivery check.
///
/// # Errors
///
/// Returns an error if the catalog cannot be loaded. Unknown and inactive
/// products render the not-found page.
#[instrument(skip(state, session, user, query))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Path(id): Path<String>,
    Query(query): Query<PincodeQuery>,
) -> Result<Response, AppError> {
    let product = match id.parse::<ProductId>() {
        Ok(id) => match state.catalog().product(id).await {
            Ok(product) => Some(product),
            Err(ServiceError::Backend(BackendError::NotFound(_))) => None,
            Err(e) => return Err(e.into()),
        },
        Err(_) => None,
    };

    let Some(product) = product else {
        let layout = Layout::load(&state, &session, user.as_ref()).await;
        return Ok((StatusCode::NOT_FOUND, NotFoundTemplate { layout }).into_response());
    };

    let related = match &product.category {
        Some(category) => state
            .catalog()
            .by_category(&category.slug)
            .await
            .map(|products| {
                products
                    .iter()
                    .filter(|p| p.id != product.id)
                    .take(RELATED_LIMIT)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default(),
        None => Vec::new(),
    };

    let pincode = query.pincode.unwrap_or_default().trim().to_string();
    let quote = (!pincode.is_empty()).then(|| DeliveryQuote::for_pincode(&pincode));

    Ok(ProductTemplate {
        wishlist: wishlist_snapshot(&state, user.as_ref()).await,
        layout: Layout::load(&state, &session, user.as_ref()).await,
        product,
        related,
        pincode,
        quote,
    }
    .into_response())
}
