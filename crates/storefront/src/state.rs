//! Application state shared across handlers.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use atelier_core::UserId;

use crate::backend::{
    AuthGateway, BackendClient, CartStore, CatalogStore, OrderStore, WishlistStore,
};
use crate::config::StorefrontConfig;
use crate::services::{
    AuthEvent, AuthService, CartService, CatalogService, OrderService, WishlistService,
};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. The services share one
/// backend client, constructed here and nowhere else.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    catalog: CatalogService,
    cart: CartService,
    wishlist: WishlistService,
    orders: OrderService,
    auth: AuthService,
}

impl AppState {
    /// Create the application state against the configured backend.
    #[must_use]
    pub fn new(config: StorefrontConfig) -> Self {
        let backend = Arc::new(BackendClient::new(&config.backend));
        Self::with_backend(config, backend)
    }

    /// Create the application state over any backend implementation.
    pub fn with_backend<B>(config: StorefrontConfig, backend: Arc<B>) -> Self
    where
        B: CatalogStore + CartStore + WishlistStore + OrderStore + AuthGateway + 'static,
    {
        let catalog = CatalogService::new(backend.clone());
        let cart = CartService::new(backend.clone(), config.cart_add_policy);
        let wishlist = WishlistService::new(backend.clone(), cart.clone());
        let orders = OrderService::new(backend.clone());
        let auth = AuthService::new(backend, &config.base_url);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                catalog,
                cart,
                wishlist,
                orders,
                auth,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    #[must_use]
    pub fn cart(&self) -> &CartService {
        &self.inner.cart
    }

    #[must_use]
    pub fn wishlist(&self) -> &WishlistService {
        &self.inner.wishlist
    }

    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }

    #[must_use]
    pub fn auth(&self) -> &AuthService {
        &self.inner.auth
    }

    /// Drop every cached view belonging to a user.
    pub async fn forget_user(&self, user_id: UserId) {
        self.inner.cart.invalidate(user_id).await;
        self.inner.wishlist.invalidate(user_id).await;
    }

    /// Follow auth events in the background: a signed-out user's cart and
    /// wishlist views are evicted.
    pub fn start_auth_listener(&self) -> JoinHandle<()> {
        let mut events = self.inner.auth.subscribe();
        let state = self.clone();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AuthEvent::SignedOut(user_id)) => {
                        state.forget_user(user_id).await;
                        info!(user_id = %user_id, "Evicted cached views after sign-out");
                    }
                    Ok(event) => debug!(?event, "Auth event"),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Auth listener lagged behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
