//! Hosted backend access: row collections and authentication.
//!
//! # Architecture
//!
//! - The backend is the source of truth - NO local persistence, direct API calls
//! - Rows are read and written through a PostgREST interface (`/rest/v1`)
//! - Sign-in, OTP, and OAuth go through the auth interface (`/auth/v1`)
//! - The rest of the storefront only sees the store traits below, so the
//!   synchronization services can be exercised against an in-memory store
//!
//! # Collections
//!
//! `products`, `categories`, `cart`, `wishlist`, `orders`, `order_items`, and
//! the `generate_order_number` remote procedure.
//!
//! # Example
//!
//! ```rust,ignore
//! use atelier_storefront::backend::{BackendClient, CartStore};
//!
//! let client = BackendClient::new(&config.backend);
//! let lines = client.cart_lines(&principal).await?;
//! ```

mod auth;
mod client;
#[cfg(test)]
pub mod memory;
pub mod query;
mod rows;
pub mod types;

pub use client::BackendClient;
pub use query::{Conflict, RowQuery};
pub use types::*;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use atelier_core::{CartLineId, Email, OrderId, Phone, ProductId, UserId};

/// Errors that can occur when talking to the hosted backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with an error status.
    #[error("Backend error ({status}{}): {message}", code.as_deref().map(|c| format!(", {c}")).unwrap_or_default())]
    Api {
        /// HTTP status code.
        status: u16,
        /// Backend error code (e.g. `23505`, `PGRST116`, `otp_expired`).
        code: Option<String>,
        /// Human-readable message from the backend.
        message: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Missing, expired, or rejected credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl BackendError {
    /// Message safe to show to the shopper (auth messages such as
    /// "Invalid login credentials" are written for end users).
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { message, .. } | Self::Unauthorized(message) => message.clone(),
            Self::RateLimited(_) => "Too many attempts, please wait a moment".to_string(),
            Self::NotFound(_) => "Not found".to_string(),
            Self::Http(_) | Self::Parse(_) => "Service temporarily unavailable".to_string(),
        }
    }

    /// Build an error from a non-success response body.
    ///
    /// Understands both the row interface's `{code, message, details, hint}`
    /// and the auth interface's `{error_code, msg}` / `{error, error_description}`
    /// shapes; anything else is kept verbatim (truncated).
    pub(crate) fn from_response(status: u16, body: &str) -> Self {
        #[derive(Deserialize)]
        struct ErrorBody {
            /// Row error code, or the HTTP status repeated by the auth service.
            code: Option<serde_json::Value>,
            error_code: Option<String>,
            message: Option<String>,
            msg: Option<String>,
            error_description: Option<String>,
            error: Option<String>,
            details: Option<String>,
        }

        let parsed = serde_json::from_str::<ErrorBody>(body).ok();
        let code = parsed.as_ref().and_then(|b| {
            b.error_code.clone().or_else(|| {
                b.code
                    .as_ref()
                    .map(|c| c.as_str().map_or_else(|| c.to_string(), str::to_string))
            })
        });
        let message = parsed
            .as_ref()
            .and_then(|b| {
                b.message
                    .clone()
                    .or_else(|| b.msg.clone())
                    .or_else(|| b.error_description.clone())
                    .or_else(|| b.error.clone())
            })
            .map(|m| match parsed.as_ref().and_then(|b| b.details.as_deref()) {
                Some(details) if !details.is_empty() => format!("{m} ({details})"),
                _ => m,
            })
            .unwrap_or_else(|| body.chars().take(200).collect());

        match status {
            401 | 403 => Self::Unauthorized(message),
            404 => Self::NotFound(message),
            _ if code.as_deref() == Some("PGRST116") => Self::NotFound(message),
            _ => Self::Api {
                status,
                code,
                message,
            },
        }
    }
}

/// The signed-in shopper a request is made on behalf of.
///
/// Row-level policies on the backend check the bearer token, so every
/// user-scoped call carries it.
#[derive(Clone)]
pub struct Principal {
    pub user_id: UserId,
    access_token: SecretString,
}

impl Principal {
    #[must_use]
    pub const fn new(user_id: UserId, access_token: SecretString) -> Self {
        Self {
            user_id,
            access_token,
        }
    }

    pub(crate) fn bearer(&self) -> &str {
        self.access_token.expose_secret()
    }
}

impl std::fmt::Debug for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Principal")
            .field("user_id", &self.user_id)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Store traits
// =============================================================================

/// Read-only product catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Active products matching the query, newest first.
    async fn list_products(&self, query: &ProductQuery) -> Result<Vec<Product>, BackendError>;

    /// A single active product.
    async fn get_product(&self, id: ProductId) -> Result<Product, BackendError>;

    /// All categories ordered by name.
    async fn list_categories(&self) -> Result<Vec<Category>, BackendError>;
}

/// The `cart` collection.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// All lines for the principal, joined with their products.
    async fn cart_lines(&self, principal: &Principal) -> Result<Vec<CartLine>, BackendError>;

    /// Insert a line, or replace the quantity of the existing line with the
    /// same (user, product, size, color). An absent size or color is sent as
    /// `''` so that lines without options still collide on the unique key.
    async fn upsert_cart_line(
        &self,
        principal: &Principal,
        line: &NewCartLine,
    ) -> Result<(), BackendError>;

    /// Update fields of a line by row id.
    async fn update_cart_line(
        &self,
        principal: &Principal,
        id: CartLineId,
        changes: &CartLineUpdate,
    ) -> Result<(), BackendError>;

    /// Delete a line by row id. Deleting a missing row succeeds.
    async fn delete_cart_line(
        &self,
        principal: &Principal,
        id: CartLineId,
    ) -> Result<(), BackendError>;

    /// Delete every line owned by the principal.
    async fn clear_cart(&self, principal: &Principal) -> Result<(), BackendError>;
}

/// The `wishlist` collection.
#[async_trait]
pub trait WishlistStore: Send + Sync {
    /// All entries for the principal, joined with their products.
    async fn wishlist_entries(
        &self,
        principal: &Principal,
    ) -> Result<Vec<WishlistEntry>, BackendError>;

    /// Add a product. Adding a product already present is a no-op.
    async fn add_wishlist_entry(
        &self,
        principal: &Principal,
        product_id: ProductId,
    ) -> Result<(), BackendError>;

    /// Remove a product. Removing a product not present succeeds.
    async fn remove_wishlist_entry(
        &self,
        principal: &Principal,
        product_id: ProductId,
    ) -> Result<(), BackendError>;
}

/// The `orders` and `order_items` collections.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// All orders for the principal with their lines, newest first.
    async fn orders(&self, principal: &Principal) -> Result<Vec<Order>, BackendError>;

    /// One of the principal's orders by its human-readable number.
    async fn order_by_number(
        &self,
        principal: &Principal,
        order_number: &str,
    ) -> Result<Option<Order>, BackendError>;

    /// Ask the backend for a fresh, unique order number.
    async fn generate_order_number(&self, principal: &Principal) -> Result<String, BackendError>;

    /// Insert the order row and return it as stored.
    async fn insert_order(
        &self,
        principal: &Principal,
        order: &NewOrder,
    ) -> Result<Order, BackendError>;

    /// Insert all lines of an order in one request.
    async fn insert_order_lines(
        &self,
        principal: &Principal,
        lines: &[NewOrderLine],
    ) -> Result<(), BackendError>;

    /// Delete an order row (used to compensate a failed checkout).
    async fn delete_order(&self, principal: &Principal, id: OrderId) -> Result<(), BackendError>;
}

/// The auth interface.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Register with email and password.
    async fn sign_up_with_email(
        &self,
        email: &Email,
        password: &SecretString,
        full_name: &str,
        redirect_to: &str,
    ) -> Result<SignUpOutcome, BackendError>;

    /// Email and password sign-in.
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, BackendError>;

    /// Send an SMS one-time code. `create_user` decides whether an unknown
    /// number registers a new account (sign-up) or is rejected (sign-in).
    async fn send_phone_otp(
        &self,
        phone: &Phone,
        create_user: bool,
        full_name: Option<&str>,
    ) -> Result<(), BackendError>;

    /// Exchange an SMS one-time code for a session.
    async fn verify_phone_otp(&self, phone: &Phone, code: &str)
    -> Result<AuthSession, BackendError>;

    /// Exchange an OAuth authorization code (PKCE) for a session.
    async fn exchange_code(
        &self,
        auth_code: &str,
        code_verifier: &str,
    ) -> Result<AuthSession, BackendError>;

    /// Trade a refresh token for a new session.
    async fn refresh_session(&self, refresh_token: &SecretString)
    -> Result<AuthSession, BackendError>;

    /// Revoke the session server-side.
    async fn sign_out(&self, access_token: &SecretString) -> Result<(), BackendError>;

    /// Where to send the browser to start a social sign-in.
    fn authorize_url(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
        code_challenge: &str,
    ) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_error_body_is_parsed() {
        let body = r#"{"code":"23505","message":"duplicate key value violates unique constraint","details":"Key (user_id, product_id) already exists.","hint":null}"#;
        let err = BackendError::from_response(409, body);
        assert!(matches!(
            &err,
            BackendError::Api { status: 409, code: Some(code), message }
                if code == "23505" && message.contains("already exists")
        ));
    }

    #[test]
    fn test_auth_error_body_is_parsed() {
        let body = r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#;
        let err = BackendError::from_response(400, body);
        assert_eq!(err.user_message(), "Invalid login credentials");
        assert!(matches!(
            &err,
            BackendError::Api { status: 400, code: Some(code), .. } if code == "invalid_credentials"
        ));
    }

    #[test]
    fn test_oauth_error_body_is_parsed() {
        let body = r#"{"error":"invalid_grant","error_description":"Invalid Refresh Token: Already Used"}"#;
        let err = BackendError::from_response(400, body);
        assert_eq!(err.user_message(), "Invalid Refresh Token: Already Used");
    }

    #[test]
    fn test_auth_error_without_error_code_keeps_numeric_code() {
        let body = r#"{"code":422,"msg":"Signups not allowed for this instance"}"#;
        match BackendError::from_response(422, body) {
            BackendError::Api { code, message, .. } => {
                assert_eq!(code.as_deref(), Some("422"));
                assert_eq!(message, "Signups not allowed for this instance");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_single_row_miss_is_not_found() {
        let body = r#"{"code":"PGRST116","message":"JSON object requested, multiple (or no) rows returned","details":"The result contains 0 rows","hint":null}"#;
        assert!(matches!(
            BackendError::from_response(406, body),
            BackendError::NotFound(_)
        ));
    }

    #[test]
    fn test_unparseable_body_is_kept_truncated() {
        let body = "x".repeat(500);
        match BackendError::from_response(502, &body) {
            BackendError::Api { message, code, .. } => {
                assert_eq!(message.len(), 200);
                assert!(code.is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_rejected_token_is_unauthorized() {
        let body = r#"{"code":"PGRST301","message":"JWT expired"}"#;
        assert!(matches!(
            BackendError::from_response(401, body),
            BackendError::Unauthorized(m) if m == "JWT expired"
        ));
    }

    #[test]
    fn test_principal_debug_redacts_token() {
        let principal = Principal::new(UserId::new_v4(), SecretString::from("eyJ.token.sig"));
        let debug = format!("{principal:?}");
        assert!(!debug.contains("eyJ.token.sig"));
        assert!(debug.contains("[REDACTED]"));
    }
}
