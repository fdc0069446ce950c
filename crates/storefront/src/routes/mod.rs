//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                          - Home page (featured products)
//! GET  /health                    - Health check
//!
//! # Catalog
//! GET  /men                       - Men's category
//! GET  /women                     - Women's category
//! GET  /products                  - Search and filter listing
//! GET  /product/{id}              - Product detail (+ ?pincode= delivery check)
//!
//! # Cart
//! GET  /cart                      - Cart, wishlist, and checkout
//! POST /cart/add                  - Add or replace a line
//! POST /cart/update               - Change a line's quantity
//! POST /cart/remove               - Remove a line
//! POST /cart/clear                - Empty the cart
//! POST /checkout                  - Place an order from the cart
//!
//! # Wishlist
//! POST /wishlist/toggle           - Add or remove a product
//! POST /wishlist/remove           - Remove a product
//! POST /wishlist/move-to-cart     - Move a product into the cart
//!
//! # Auth
//! GET  /login                     - Login page (email, register, phone tabs)
//! POST /login/email               - Email/password sign-in
//! POST /login/register            - Email registration
//! POST /login/phone               - Send an SMS code
//! POST /login/verify              - Check the SMS code
//! POST /login/resend              - Send the SMS code again
//! GET  /login/oauth/{provider}    - Start social sign-in
//! GET  /auth/callback             - Social sign-in return
//! POST /logout                    - Sign out
//!
//! # Account
//! GET  /track-order               - Order history and tracking (requires auth)
//! GET  /address                   - Address book
//! POST /address                   - Add an address
//! POST /address/{id}              - Update an address
//! POST /address/{id}/delete       - Delete an address
//! POST /address/{id}/default      - Make an address the default
//! ```
//!
//! Form posts answer with a redirect (POST-redirect-GET); outcomes are shown
//! as flash notifications on the next page.

pub mod address;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod home;
pub mod orders;
pub mod wishlist;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::{get, post},
};
use tower_sessions::Session;
use tracing::warn;

use crate::filters;
use crate::models::{CurrentUser, Flash};
use crate::services::cart as cart_service;
use crate::state::AppState;

// =============================================================================
// Shared page chrome
// =============================================================================

/// Data every page renders in its header and toast area.
pub struct Layout {
    pub user_name: Option<String>,
    pub cart_count: u32,
    pub wishlist_count: usize,
    pub flashes: Vec<Flash>,
}

impl Layout {
    /// Load header counts and take pending notifications.
    ///
    /// A failed count fetch renders as zero rather than failing the page.
    pub async fn load(state: &AppState, session: &Session, user: Option<&CurrentUser>) -> Self {
        let principal = user.map(CurrentUser::principal);

        let cart_count = match state.cart().fetch(principal.as_ref()).await {
            Ok(lines) => cart_service::count(&lines),
            Err(e) => {
                warn!(error = %e, "Failed to load cart count");
                0
            }
        };
        let wishlist_count = match state.wishlist().fetch(principal.as_ref()).await {
            Ok(entries) => entries.len(),
            Err(e) => {
                warn!(error = %e, "Failed to load wishlist count");
                0
            }
        };

        Self {
            user_name: user.map(|u| u.display_name().to_string()),
            cart_count,
            wishlist_count,
            flashes: Flash::take(session).await,
        }
    }
}

/// Only same-site paths are followed after a form post.
fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}

/// Redirect to the form's `redirect_to` when it is a local path.
pub(crate) fn redirect_back(redirect_to: Option<&str>, default: &str) -> Redirect {
    let target = redirect_to
        .map(str::trim)
        .filter(|p| is_local_path(p))
        .unwrap_or(default);
    Redirect::to(target)
}

// =============================================================================
// Health and fallback
// =============================================================================

/// Liveness health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Not-found page template.
#[derive(Template, WebTemplate)]
#[template(path = "errors/not_found.html")]
pub struct NotFoundTemplate {
    pub layout: Layout,
}

/// Catch-all 404 page.
pub async fn not_found(
    State(state): State<AppState>,
    session: Session,
    crate::middleware::OptionalAuth(user): crate::middleware::OptionalAuth,
) -> impl IntoResponse {
    let layout = Layout::load(&state, &session, user.as_ref()).await;
    (StatusCode::NOT_FOUND, NotFoundTemplate { layout })
}

// =============================================================================
// Routers
// =============================================================================

/// Create the catalog routes router.
pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/men", get(catalog::men))
        .route("/women", get(catalog::women))
        .route("/products", get(catalog::index))
        .route("/product/{id}", get(catalog::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/clear", post(cart::clear))
}

/// Create the wishlist routes router.
pub fn wishlist_routes() -> Router<AppState> {
    Router::new()
        .route("/toggle", post(wishlist::toggle))
        .route("/remove", post(wishlist::remove))
        .route("/move-to-cart", post(wishlist::move_to_cart))
}

/// Create the sign-in submission router.
///
/// These are the endpoints that check passwords and codes or send SMS; the
/// caller puts the rate limiter on this router.
pub fn login_submit_routes() -> Router<AppState> {
    Router::new()
        .route("/login/email", post(auth::login_email))
        .route("/login/register", post(auth::register))
        .route("/login/phone", post(auth::start_phone))
        .route("/login/verify", post(auth::verify))
        .route("/login/resend", post(auth::resend))
}

/// Create the remaining auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page))
        .route("/login/oauth/{provider}", get(auth::oauth_start))
        .route("/auth/callback", get(auth::oauth_callback))
        .route("/logout", post(auth::logout))
}

/// Create the address book routes router.
pub fn address_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(address::index).post(address::create))
        .route("/{id}", post(address::update))
        .route("/{id}/delete", post(address::delete))
        .route("/{id}/default", post(address::set_default))
}

/// Create all routes for the storefront except the sign-in submissions.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .route("/health", get(health))
        .merge(catalog_routes())
        .nest("/cart", cart_routes())
        .route("/checkout", post(cart::checkout))
        .nest("/wishlist", wishlist_routes())
        .merge(auth_routes())
        .route("/track-order", get(orders::track))
        .nest("/address", address_routes())
        .fallback(not_found)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use axum::body::Body;
    use axum::http::{Request, Response, header};
    use tower::ServiceExt;

    use super::*;
    use crate::backend::memory::OTP_CODE;
    use crate::state::tests::{TestApp, test_app};

    /// A browser with a cookie jar of one session cookie.
    pub(crate) struct Browser {
        pub app: TestApp,
        router: Router,
        cookie: Option<String>,
    }

    impl Browser {
        pub(crate) fn new() -> Self {
            let app = test_app();
            let router = crate::app(app.state.clone());
            Self {
                app,
                router,
                cookie: None,
            }
        }

        async fn send(&mut self, request: Request<Body>) -> Response<Body> {
            let response = self.router.clone().oneshot(request).await.unwrap();
            if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
                let pair = set_cookie.to_str().unwrap().split(';').next().unwrap();
                self.cookie = Some(pair.to_string());
            }
            response
        }

        fn request(&self, method: &str, uri: &str) -> axum::http::request::Builder {
            let builder = Request::builder()
                .method(method)
                .uri(uri)
                .header("x-forwarded-for", "203.0.113.7");
            match &self.cookie {
                Some(cookie) => builder.header(header::COOKIE, cookie),
                None => builder,
            }
        }

        pub(crate) async fn get(&mut self, uri: &str) -> Response<Body> {
            let request = self.request("GET", uri).body(Body::empty()).unwrap();
            self.send(request).await
        }

        pub(crate) async fn post(&mut self, uri: &str, form: &str) -> Response<Body> {
            let request = self
                .request("POST", uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form.to_string()))
                .unwrap();
            self.send(request).await
        }

        /// Sign in over phone with the fixed test code.
        pub(crate) async fn sign_in(&mut self) {
            self.post(
                "/login/phone",
                "purpose=sign_up&phone=%2B919876543210&full_name=Asha+Rao",
            )
            .await;
            let response = self.post("/login/verify", &format!("code={OTP_CODE}")).await;
            assert_eq!(location(&response), "/");
        }
    }

    pub(crate) fn location(response: &Response<Body>) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    pub(crate) async fn body_text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_redirect_back_only_follows_local_paths() {
        assert!(is_local_path("/product/abc"));
        assert!(!is_local_path("//evil.example"));
        assert!(!is_local_path("https://evil.example"));
        assert!(!is_local_path("/\\evil.example"));
    }

    #[tokio::test]
    async fn test_health() {
        let mut browser = Browser::new();
        let response = browser.get("/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ok");
    }

    #[tokio::test]
    async fn test_unknown_path_renders_not_found_page() {
        let mut browser = Browser::new();
        let response = browser.get("/no/such/page").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_text(response).await.contains("Page not found"));
    }

    #[tokio::test]
    async fn test_flash_survives_redirect_once() {
        let mut browser = Browser::new();
        let response = browser.get("/track-order").await;
        assert_eq!(location(&response), "/login");

        let page = body_text(browser.get("/login").await).await;
        assert!(page.contains("Please log in to continue"));
        let again = body_text(browser.get("/login").await).await;
        assert!(!again.contains("Please log in to continue"));
    }
}
