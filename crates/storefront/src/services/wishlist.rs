//! Wishlist synchronization over the `wishlist` collection.
//!
//! Only one change per (user, product) may be in flight at a time. A second
//! add, remove, or toggle for the same product while the first is still
//! running is rejected with [`ServiceError::Busy`], and pages render that
//! product's heart as disabled until the first change lands.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use moka::future::Cache;
use tracing::{debug, instrument};

use atelier_core::{ProductId, Quantity, UserId};

use crate::backend::{Principal, WishlistEntry, WishlistStore};

use super::cart::{CartItem, CartService};
use super::ServiceError;

/// Outcome of a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggled {
    Added,
    Removed,
}

/// Membership view over the last fetched wishlist rows.
#[derive(Debug, Clone, Default)]
pub struct WishlistSnapshot {
    products: HashSet<ProductId>,
    pending: HashSet<ProductId>,
}

impl WishlistSnapshot {
    /// Whether the product was in the wishlist when it was last fetched.
    #[must_use]
    pub fn is_in_wishlist(&self, product_id: &ProductId) -> bool {
        self.products.contains(product_id)
    }

    /// Whether a change to this product is still in flight.
    #[must_use]
    pub fn is_pending(&self, product_id: &ProductId) -> bool {
        self.pending.contains(product_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.products.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

type InFlight = Arc<Mutex<HashSet<(UserId, ProductId)>>>;

/// Releases the in-flight slot when the change finishes, however it ends.
struct InFlightGuard {
    in_flight: InFlight,
    key: (UserId, ProductId),
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Cached wishlist view per user.
#[derive(Clone)]
pub struct WishlistService {
    store: Arc<dyn WishlistStore>,
    cart: CartService,
    cache: Cache<UserId, Arc<Vec<WishlistEntry>>>,
    in_flight: InFlight,
}

impl WishlistService {
    #[must_use]
    pub fn new(store: Arc<dyn WishlistStore>, cart: CartService) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_idle(Duration::from_secs(30 * 60))
            .build();
        Self {
            store,
            cart,
            cache,
            in_flight: Arc::default(),
        }
    }

    /// The shopper's wishlist joined with product data. Anonymous shoppers
    /// have an empty wishlist and cost no backend call.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self), fields(user_id = ?principal.map(|p| p.user_id)))]
    pub async fn fetch(
        &self,
        principal: Option<&Principal>,
    ) -> Result<Arc<Vec<WishlistEntry>>, ServiceError> {
        let Some(principal) = principal else {
            return Ok(Arc::default());
        };

        if let Some(entries) = self.cache.get(&principal.user_id).await {
            debug!("Cache hit for wishlist");
            return Ok(entries);
        }

        let entries = Arc::new(self.store.wishlist_entries(principal).await?);
        self.cache
            .insert(principal.user_id, Arc::clone(&entries))
            .await;
        Ok(entries)
    }

    /// Membership snapshot for rendering hearts.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    pub async fn snapshot(
        &self,
        principal: Option<&Principal>,
    ) -> Result<WishlistSnapshot, ServiceError> {
        let entries = self.fetch(principal).await?;
        let pending = principal.map_or_else(HashSet::new, |p| self.pending_for(p.user_id));
        Ok(WishlistSnapshot {
            products: entries.iter().map(|e| e.product_id).collect(),
            pending,
        })
    }

    /// Whether a change to this product is in flight for this user.
    #[must_use]
    pub fn is_pending(&self, user_id: UserId, product_id: ProductId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(user_id, product_id))
    }

    fn pending_for(&self, user_id: UserId) -> HashSet<ProductId> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(user, _)| *user == user_id)
            .map(|(_, product)| *product)
            .collect()
    }

    fn begin(&self, user_id: UserId, product_id: ProductId) -> Result<InFlightGuard, ServiceError> {
        let key = (user_id, product_id);
        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key);
        if inserted {
            Ok(InFlightGuard {
                in_flight: Arc::clone(&self.in_flight),
                key,
            })
        } else {
            Err(ServiceError::Busy(product_id))
        }
    }

    /// Add a product. Adding one that is already there is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `Busy` if a change to this product is in flight, or an error
    /// if the backend request fails.
    #[instrument(skip(self), fields(user_id = %principal.user_id, product_id = %product_id))]
    pub async fn add(
        &self,
        principal: &Principal,
        product_id: ProductId,
    ) -> Result<Arc<Vec<WishlistEntry>>, ServiceError> {
        let _guard = self.begin(principal.user_id, product_id)?;
        self.store.add_wishlist_entry(principal, product_id).await?;
        self.refresh(principal).await
    }

    /// Remove a product. Removing one that is not there succeeds.
    ///
    /// # Errors
    ///
    /// Returns `Busy` if a change to this product is in flight, or an error
    /// if the backend request fails.
    #[instrument(skip(self), fields(user_id = %principal.user_id, product_id = %product_id))]
    pub async fn remove(
        &self,
        principal: &Principal,
        product_id: ProductId,
    ) -> Result<Arc<Vec<WishlistEntry>>, ServiceError> {
        let _guard = self.begin(principal.user_id, product_id)?;
        self.store
            .remove_wishlist_entry(principal, product_id)
            .await?;
        self.refresh(principal).await
    }

    /// Add the product if absent, remove it if present.
    ///
    /// # Errors
    ///
    /// Returns `Busy` if a change to this product is in flight, or an error
    /// if the backend request fails.
    #[instrument(skip(self), fields(user_id = %principal.user_id, product_id = %product_id))]
    pub async fn toggle(
        &self,
        principal: &Principal,
        product_id: ProductId,
    ) -> Result<Toggled, ServiceError> {
        let _guard = self.begin(principal.user_id, product_id)?;
        let present = self
            .fetch(Some(principal))
            .await?
            .iter()
            .any(|e| e.product_id == product_id);

        let toggled = if present {
            self.store
                .remove_wishlist_entry(principal, product_id)
                .await?;
            Toggled::Removed
        } else {
            self.store.add_wishlist_entry(principal, product_id).await?;
            Toggled::Added
        };
        self.refresh(principal).await?;
        Ok(toggled)
    }

    /// Put one of the product in the cart, then take it off the wishlist.
    ///
    /// # Errors
    ///
    /// Returns `Busy` if a change to this product is in flight, or an error
    /// if either backend request fails. If the cart add fails the wishlist
    /// is left alone.
    #[instrument(skip(self), fields(user_id = %principal.user_id, product_id = %product_id))]
    pub async fn move_to_cart(
        &self,
        principal: &Principal,
        product_id: ProductId,
        size: Option<String>,
    ) -> Result<(), ServiceError> {
        let _guard = self.begin(principal.user_id, product_id)?;
        self.cart
            .add(
                principal,
                CartItem::new(product_id, Quantity::ONE).with_size(size),
            )
            .await?;
        self.store
            .remove_wishlist_entry(principal, product_id)
            .await?;
        self.refresh(principal).await?;
        Ok(())
    }

    /// Drop the cached view for a user (sign-out).
    pub async fn invalidate(&self, user_id: UserId) {
        self.cache.invalidate(&user_id).await;
    }

    async fn refresh(
        &self,
        principal: &Principal,
    ) -> Result<Arc<Vec<WishlistEntry>>, ServiceError> {
        self.cache.invalidate(&principal.user_id).await;
        self.fetch(Some(principal)).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryBackend, Op};
    use crate::backend::types::fixtures::product;
    use crate::backend::Product;
    use crate::services::cart::AddPolicy;
    use secrecy::SecretString;

    struct Fixture {
        backend: Arc<MemoryBackend>,
        wishlist: WishlistService,
        cart: CartService,
        principal: Principal,
        dress: Product,
    }

    fn fixture() -> Fixture {
        let dress = product("Black Dress", 2499, None);
        let backend = Arc::new(MemoryBackend::new().with_products(vec![dress.clone()]));
        let cart = CartService::new(backend.clone(), AddPolicy::Replace);
        Fixture {
            wishlist: WishlistService::new(backend.clone(), cart.clone()),
            cart,
            backend,
            principal: Principal::new(UserId::new_v4(), SecretString::from("token")),
            dress,
        }
    }

    #[tokio::test]
    async fn test_membership_follows_confirmed_writes() {
        let f = fixture();
        f.wishlist.add(&f.principal, f.dress.id).await.unwrap();
        let snapshot = f.wishlist.snapshot(Some(&f.principal)).await.unwrap();
        assert!(snapshot.is_in_wishlist(&f.dress.id));

        f.wishlist.remove(&f.principal, f.dress.id).await.unwrap();
        let snapshot = f.wishlist.snapshot(Some(&f.principal)).await.unwrap();
        assert!(!snapshot.is_in_wishlist(&f.dress.id));
    }

    #[tokio::test]
    async fn test_repeated_add_keeps_one_entry() {
        let f = fixture();
        f.wishlist.add(&f.principal, f.dress.id).await.unwrap();
        let entries = f.wishlist.add(&f.principal, f.dress.id).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_toggle_flips_membership() {
        let f = fixture();
        assert_eq!(
            f.wishlist.toggle(&f.principal, f.dress.id).await.unwrap(),
            Toggled::Added
        );
        assert_eq!(
            f.wishlist.toggle(&f.principal, f.dress.id).await.unwrap(),
            Toggled::Removed
        );
    }

    #[tokio::test]
    async fn test_second_change_while_in_flight_is_busy() {
        let f = fixture();
        let gate = f.backend.wishlist_gate.lock().await;

        let wishlist = f.wishlist.clone();
        let principal = f.principal.clone();
        let product_id = f.dress.id;
        let first = tokio::spawn(async move { wishlist.toggle(&principal, product_id).await });

        for _ in 0..100 {
            if f.wishlist.is_pending(f.principal.user_id, product_id) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(f.wishlist.is_pending(f.principal.user_id, product_id));

        let snapshot = f.wishlist.snapshot(Some(&f.principal)).await.unwrap();
        assert!(snapshot.is_pending(&product_id));
        assert!(matches!(
            f.wishlist.toggle(&f.principal, product_id).await,
            Err(ServiceError::Busy(id)) if id == product_id
        ));

        drop(gate);
        assert_eq!(first.await.unwrap().unwrap(), Toggled::Added);
        assert!(!f.wishlist.is_pending(f.principal.user_id, product_id));
    }

    #[tokio::test]
    async fn test_failed_change_releases_guard() {
        let f = fixture();
        f.backend.fail(Op::WishlistWrite);
        assert!(f.wishlist.add(&f.principal, f.dress.id).await.is_err());
        assert!(!f.wishlist.is_pending(f.principal.user_id, f.dress.id));

        f.backend.recover(Op::WishlistWrite);
        assert!(f.wishlist.add(&f.principal, f.dress.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_move_to_cart_adds_one_and_removes_entry() {
        let f = fixture();
        f.wishlist.add(&f.principal, f.dress.id).await.unwrap();
        f.wishlist
            .move_to_cart(&f.principal, f.dress.id, Some("M".to_string()))
            .await
            .unwrap();

        let cart = f.cart.fetch(Some(&f.principal)).await.unwrap();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart[0].quantity, Quantity::ONE);
        assert_eq!(cart[0].size.as_deref(), Some("M"));
        assert!(f.wishlist.fetch(Some(&f.principal)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_move_to_cart_keeps_entry_when_cart_add_fails() {
        let f = fixture();
        f.wishlist.add(&f.principal, f.dress.id).await.unwrap();
        f.backend.fail(Op::CartWrite);

        assert!(f
            .wishlist
            .move_to_cart(&f.principal, f.dress.id, None)
            .await
            .is_err());
        assert_eq!(f.wishlist.fetch(Some(&f.principal)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_anonymous_snapshot_is_empty() {
        let f = fixture();
        let snapshot = f.wishlist.snapshot(None).await.unwrap();
        assert!(snapshot.is_empty());
        assert!(f.backend.calls().is_empty());
    }
}
