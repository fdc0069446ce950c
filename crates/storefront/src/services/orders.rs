//! Order placement and tracking.
//!
//! Checkout is a sequence of backend calls: reserve an order number, insert
//! the order row, insert its lines. The row interface has no multi-request
//! transaction, so a failed line insert is compensated by deleting the order
//! row again.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{error, info, instrument, warn};

use atelier_core::{PaymentMethod, ProductId, Quantity, ShippingAddress};

use crate::backend::{CartLine, NewOrder, NewOrderLine, Order, OrderStore, Principal};

use super::ServiceError;

/// One line being bought, with its price captured when the line was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutItem {
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub size: Option<String>,
    pub color: Option<String>,
    pub unit_price: Decimal,
}

impl CheckoutItem {
    /// Capture a cart line at its current effective price. Lines whose
    /// product is no longer available yield `None`.
    #[must_use]
    pub fn from_cart_line(line: &CartLine) -> Option<Self> {
        line.product.as_ref().map(|product| Self {
            product_id: line.product_id,
            quantity: line.quantity,
            size: line.size.clone(),
            color: line.color.clone(),
            unit_price: product.unit_amount(),
        })
    }

    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity.get())
    }
}

/// Everything needed to place an order.
#[derive(Debug, Clone)]
pub struct Checkout {
    pub items: Vec<CheckoutItem>,
    pub shipping_address: ShippingAddress,
    pub billing_address: Option<ShippingAddress>,
    pub payment_method: PaymentMethod,
}

impl Checkout {
    /// Sum of unit price times quantity over the captured items.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.items.iter().map(CheckoutItem::line_total).sum()
    }
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
}

impl OrderService {
    #[must_use]
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Place an order.
    ///
    /// # Errors
    ///
    /// - `EmptyOrder` when there are no items; nothing is sent.
    /// - `Backend` when the order number or order row cannot be created; no
    ///   rows exist afterwards.
    /// - `OrderLinesFailed` when the lines cannot be inserted and the order
    ///   row was deleted again.
    /// - `OrphanedOrder` when the lines cannot be inserted and deleting the
    ///   order row failed too: the order exists with zero lines.
    #[instrument(skip(self, checkout), fields(user_id = %principal.user_id, items = checkout.items.len()))]
    pub async fn place_order(
        &self,
        principal: &Principal,
        checkout: Checkout,
    ) -> Result<Order, ServiceError> {
        if checkout.items.is_empty() {
            return Err(ServiceError::EmptyOrder);
        }

        let total_amount = checkout.total();
        let order_number = self.store.generate_order_number(principal).await?;

        let new_order = NewOrder {
            user_id: principal.user_id,
            order_number,
            total_amount,
            shipping_address: checkout.shipping_address,
            billing_address: checkout.billing_address,
            payment_method: checkout.payment_method,
        };
        let mut order = self.store.insert_order(principal, &new_order).await?;

        let lines: Vec<NewOrderLine> = checkout
            .items
            .into_iter()
            .map(|item| NewOrderLine {
                order_id: order.id,
                product_id: item.product_id,
                quantity: item.quantity,
                size: item.size,
                color: item.color,
                price: item.unit_price,
            })
            .collect();

        if let Err(source) = self.store.insert_order_lines(principal, &lines).await {
            warn!(
                order_number = %order.order_number,
                error = %source,
                "Order lines failed, deleting order"
            );
            return match self.store.delete_order(principal, order.id).await {
                Ok(()) => Err(ServiceError::OrderLinesFailed {
                    order_number: order.order_number,
                    source,
                }),
                Err(rollback) => {
                    error!(
                        order_number = %order.order_number,
                        order_id = %order.id,
                        error = %rollback,
                        "Failed to delete order after line insert failure"
                    );
                    Err(ServiceError::OrphanedOrder {
                        order_number: order.order_number,
                        source,
                    })
                }
            };
        }

        info!(order_number = %order.order_number, total = %total_amount, "Order placed");

        // The inserted row comes back without its lines
        if order.lines.is_empty()
            && let Ok(Some(stored)) = self
                .store
                .order_by_number(principal, &order.order_number)
                .await
        {
            order = stored;
        }
        Ok(order)
    }

    /// The shopper's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    pub async fn orders(&self, principal: &Principal) -> Result<Vec<Order>, ServiceError> {
        Ok(self.store.orders(principal).await?)
    }

    /// One of the shopper's orders by number, for the tracking page.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self), fields(user_id = %principal.user_id))]
    pub async fn track(
        &self,
        principal: &Principal,
        order_number: &str,
    ) -> Result<Option<Order>, ServiceError> {
        let order_number = order_number.trim();
        if order_number.is_empty() {
            return Ok(None);
        }
        Ok(self.store.order_by_number(principal, order_number).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryBackend, Op};
    use crate::backend::types::fixtures::product;
    use crate::backend::{BackendError, Product};
    use atelier_core::{AddressLabel, OrderStatus, UserId};
    use secrecy::SecretString;

    struct Fixture {
        backend: Arc<MemoryBackend>,
        orders: OrderService,
        principal: Principal,
        shirt: Product,
        dress: Product,
    }

    fn fixture() -> Fixture {
        let shirt = product("Oxford Shirt", 1299, Some(999));
        let dress = product("Black Dress", 2499, None);
        let backend = Arc::new(
            MemoryBackend::new().with_products(vec![shirt.clone(), dress.clone()]),
        );
        Fixture {
            orders: OrderService::new(backend.clone()),
            backend,
            principal: Principal::new(UserId::new_v4(), SecretString::from("token")),
            shirt,
            dress,
        }
    }

    fn address() -> ShippingAddress {
        ShippingAddress::parse(
            AddressLabel::Home,
            "Asha Rao",
            "12 MG Road",
            "Bengaluru",
            "KA",
            "560001",
            "+919876543210",
        )
        .unwrap()
    }

    fn item(product: &Product, quantity: u32) -> CheckoutItem {
        CheckoutItem {
            product_id: product.id,
            quantity: Quantity::new(quantity).unwrap(),
            size: Some("M".to_string()),
            color: None,
            unit_price: product.unit_amount(),
        }
    }

    fn checkout(items: Vec<CheckoutItem>) -> Checkout {
        Checkout {
            items,
            shipping_address: address(),
            billing_address: None,
            payment_method: PaymentMethod::Upi,
        }
    }

    #[tokio::test]
    async fn test_total_is_sum_of_captured_prices() {
        let f = fixture();
        let items = vec![item(&f.shirt, 2), item(&f.dress, 1)];

        // Live prices change after the items were captured
        f.backend.reprice(f.shirt.id, Decimal::from(5000));

        let order = f
            .orders
            .place_order(&f.principal, checkout(items))
            .await
            .unwrap();

        assert_eq!(order.total_amount, Decimal::from(999 * 2 + 2499));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.lines.len(), 2);
        assert!(order.lines.iter().any(|l| l.price == Decimal::from(999)));
    }

    #[tokio::test]
    async fn test_empty_checkout_sends_nothing() {
        let f = fixture();
        assert!(matches!(
            f.orders.place_order(&f.principal, checkout(vec![])).await,
            Err(ServiceError::EmptyOrder)
        ));
        assert!(f.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_order_number_failure_creates_nothing() {
        let f = fixture();
        f.backend.fail(Op::OrderNumber);
        let result = f
            .orders
            .place_order(&f.principal, checkout(vec![item(&f.shirt, 1)]))
            .await;

        assert!(matches!(result, Err(ServiceError::Backend(BackendError::Api { .. }))));
        assert_eq!(f.backend.order_count(), 0);
        assert_eq!(f.backend.order_line_count(), 0);
    }

    #[tokio::test]
    async fn test_order_insert_failure_creates_nothing() {
        let f = fixture();
        f.backend.fail(Op::InsertOrder);
        assert!(f
            .orders
            .place_order(&f.principal, checkout(vec![item(&f.shirt, 1)]))
            .await
            .is_err());
        assert_eq!(f.backend.order_count(), 0);
        assert!(!f.backend.calls().contains(&"insert_order_lines"));
    }

    #[tokio::test]
    async fn test_line_failure_deletes_order() {
        let f = fixture();
        f.backend.fail(Op::InsertOrderLines);
        let result = f
            .orders
            .place_order(&f.principal, checkout(vec![item(&f.shirt, 1)]))
            .await;

        assert!(matches!(
            result,
            Err(ServiceError::OrderLinesFailed { ref order_number, .. }) if order_number == "ORD-000001"
        ));
        assert_eq!(f.backend.order_count(), 0);
        assert_eq!(f.backend.order_line_count(), 0);
    }

    #[tokio::test]
    async fn test_line_failure_with_failed_rollback_leaves_empty_order() {
        let f = fixture();
        f.backend.fail(Op::InsertOrderLines);
        f.backend.fail(Op::DeleteOrder);
        let result = f
            .orders
            .place_order(&f.principal, checkout(vec![item(&f.shirt, 1)]))
            .await;

        assert!(matches!(result, Err(ServiceError::OrphanedOrder { .. })));
        assert_eq!(f.backend.order_count(), 1);
        assert_eq!(f.backend.order_line_count(), 0);
    }

    #[tokio::test]
    async fn test_track_finds_own_order_by_number() {
        let f = fixture();
        let placed = f
            .orders
            .place_order(&f.principal, checkout(vec![item(&f.dress, 1)]))
            .await
            .unwrap();

        let found = f
            .orders
            .track(&f.principal, &format!(" {} ", placed.order_number))
            .await
            .unwrap();
        assert_eq!(found.map(|o| o.id), Some(placed.id));

        let stranger = Principal::new(UserId::new_v4(), SecretString::from("other"));
        assert!(f
            .orders
            .track(&stranger, &placed.order_number)
            .await
            .unwrap()
            .is_none());
        assert!(f.orders.track(&f.principal, "  ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_orders_newest_first() {
        let f = fixture();
        for product in [&f.shirt, &f.dress] {
            f.orders
                .place_order(&f.principal, checkout(vec![item(product, 1)]))
                .await
                .unwrap();
        }
        let orders = f.orders.orders(&f.principal).await.unwrap();
        assert_eq!(orders.len(), 2);
        assert!(orders[0].created_at >= orders[1].created_at);
    }
}
