//! In-memory backend for tests.
//!
//! Implements every store trait over plain vectors with the same observable
//! semantics as the hosted backend: merge-on-conflict cart upserts (an
//! absent size or color is one slot, as the blank wire encoding makes it),
//! ignore-on-conflict wishlist upserts, zero-row deletes that succeed, and
//! all-or-nothing batch inserts. Individual operations can be made to fail.
#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use secrecy::{ExposeSecret, SecretString};

use atelier_core::{
    CartLineId, Email, OrderId, OrderLineId, OrderStatus, Phone, ProductId, UserId,
    WishlistEntryId,
};

use super::{
    AuthGateway, AuthSession, AuthUser, BackendError, CartLine, CartLineUpdate, CartStore,
    CatalogStore, Category, NewCartLine, NewOrder, NewOrderLine, OAuthProvider, Order, OrderLine,
    OrderStore, Principal, Product, ProductQuery, SignUpOutcome, WishlistEntry, WishlistStore,
};

/// The one-time code every SMS "delivers".
pub const OTP_CODE: &str = "123456";
/// The authorization code the fake OAuth provider hands back.
pub const OAUTH_CODE: &str = "oauth-code";

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ListProducts,
    CartRead,
    CartWrite,
    WishlistRead,
    WishlistWrite,
    OrderNumber,
    InsertOrder,
    InsertOrderLines,
    DeleteOrder,
    SignIn,
}

#[derive(Default)]
struct State {
    products: Vec<Product>,
    categories: Vec<Category>,
    cart: Vec<CartLine>,
    wishlist: Vec<WishlistEntry>,
    orders: Vec<Order>,
    order_lines: Vec<OrderLine>,
    order_counter: u32,
    /// email or phone -> (user id, password, full name)
    accounts: HashMap<String, (UserId, Option<String>, Option<String>)>,
    otp_sent: Vec<(String, bool)>,
    signed_out: usize,
    calls: Vec<&'static str>,
}

#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
    failing: Mutex<HashSet<Op>>,
    /// Held by a test to keep wishlist writes in flight.
    pub wishlist_gate: tokio::sync::Mutex<()>,
}

fn injected() -> BackendError {
    BackendError::Api {
        status: 500,
        code: None,
        message: "injected failure".to_string(),
    }
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the catalog.
    #[must_use]
    pub fn with_products(self, products: Vec<Product>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for category in products.iter().filter_map(|p| p.category.clone()) {
                if !state.categories.iter().any(|c| c.id == category.id) {
                    state.categories.push(category);
                }
            }
            state.products = products;
        }
        self
    }

    pub fn fail(&self, op: Op) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn recover(&self, op: Op) {
        self.failing.lock().unwrap().remove(&op);
    }

    /// Names of the store calls made so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn order_count(&self) -> usize {
        self.state.lock().unwrap().orders.len()
    }

    pub fn order_line_count(&self) -> usize {
        self.state.lock().unwrap().order_lines.len()
    }

    pub fn cart_rows(&self) -> Vec<CartLine> {
        self.state.lock().unwrap().cart.clone()
    }

    pub fn otp_sent(&self) -> Vec<(String, bool)> {
        self.state.lock().unwrap().otp_sent.clone()
    }

    pub fn signed_out(&self) -> usize {
        self.state.lock().unwrap().signed_out
    }

    /// Change a product's live price after it was captured somewhere.
    pub fn reprice(&self, id: ProductId, price: rust_decimal::Decimal) {
        let mut state = self.state.lock().unwrap();
        if let Some(product) = state.products.iter_mut().find(|p| p.id == id) {
            product.price = price;
            product.sale_price = None;
        }
    }

    /// Register an email account.
    pub fn register(&self, email: &str, password: &str) -> UserId {
        let id = UserId::new_v4();
        self.state.lock().unwrap().accounts.insert(
            email.to_string(),
            (id, Some(password.to_string()), None),
        );
        id
    }

    fn enter(&self, call: &'static str, op: Option<Op>) -> Result<(), BackendError> {
        self.state.lock().unwrap().calls.push(call);
        match op {
            Some(op) if self.failing.lock().unwrap().contains(&op) => Err(injected()),
            _ => Ok(()),
        }
    }

    fn product(state: &State, id: ProductId) -> Option<Product> {
        state.products.iter().find(|p| p.id == id).cloned()
    }

    fn session(user: AuthUser) -> AuthSession {
        AuthSession {
            access_token: SecretString::from(format!("access-{}", uuid::Uuid::new_v4())),
            refresh_token: SecretString::from(format!("refresh-{}", uuid::Uuid::new_v4())),
            expires_at: Utc::now() + Duration::hours(1),
            user,
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryBackend {
    async fn list_products(&self, query: &ProductQuery) -> Result<Vec<Product>, BackendError> {
        self.enter("list_products", Some(Op::ListProducts))?;
        let state = self.state.lock().unwrap();
        let mut products: Vec<Product> = state
            .products
            .iter()
            .filter(|p| query.matches(p))
            .cloned()
            .collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = query.limit {
            products.truncate(limit);
        }
        Ok(products)
    }

    async fn get_product(&self, id: ProductId) -> Result<Product, BackendError> {
        self.enter("get_product", None)?;
        let state = self.state.lock().unwrap();
        Self::product(&state, id)
            .filter(|p| p.is_active)
            .ok_or_else(|| BackendError::NotFound(format!("product {id}")))
    }

    async fn list_categories(&self) -> Result<Vec<Category>, BackendError> {
        self.enter("list_categories", None)?;
        let mut categories = self.state.lock().unwrap().categories.clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }
}

#[async_trait]
impl CartStore for MemoryBackend {
    async fn cart_lines(&self, principal: &Principal) -> Result<Vec<CartLine>, BackendError> {
        self.enter("cart_lines", Some(Op::CartRead))?;
        let state = self.state.lock().unwrap();
        Ok(state
            .cart
            .iter()
            .filter(|l| l.user_id == principal.user_id)
            .map(|l| CartLine {
                product: Self::product(&state, l.product_id),
                ..l.clone()
            })
            .collect())
    }

    async fn upsert_cart_line(
        &self,
        principal: &Principal,
        line: &NewCartLine,
    ) -> Result<(), BackendError> {
        self.enter("upsert_cart_line", Some(Op::CartWrite))?;
        let mut state = self.state.lock().unwrap();
        let existing = state.cart.iter_mut().find(|l| {
            l.user_id == principal.user_id
                && l.same_slot(line.product_id, line.size.as_deref(), line.color.as_deref())
        });
        match existing {
            Some(row) => row.quantity = line.quantity,
            None => state.cart.push(CartLine {
                id: CartLineId::new_v4(),
                user_id: line.user_id,
                product_id: line.product_id,
                quantity: line.quantity,
                size: line.size.clone(),
                color: line.color.clone(),
                created_at: Utc::now(),
                product: None,
            }),
        }
        Ok(())
    }

    async fn update_cart_line(
        &self,
        principal: &Principal,
        id: CartLineId,
        changes: &CartLineUpdate,
    ) -> Result<(), BackendError> {
        self.enter("update_cart_line", Some(Op::CartWrite))?;
        let mut state = self.state.lock().unwrap();
        if let Some(row) = state
            .cart
            .iter_mut()
            .find(|l| l.id == id && l.user_id == principal.user_id)
        {
            if let Some(quantity) = changes.quantity {
                row.quantity = quantity;
            }
            if let Some(size) = &changes.size {
                row.size = Some(size.clone());
            }
            if let Some(color) = &changes.color {
                row.color = Some(color.clone());
            }
        }
        Ok(())
    }

    async fn delete_cart_line(
        &self,
        principal: &Principal,
        id: CartLineId,
    ) -> Result<(), BackendError> {
        self.enter("delete_cart_line", Some(Op::CartWrite))?;
        self.state
            .lock()
            .unwrap()
            .cart
            .retain(|l| !(l.id == id && l.user_id == principal.user_id));
        Ok(())
    }

    async fn clear_cart(&self, principal: &Principal) -> Result<(), BackendError> {
        self.enter("clear_cart", Some(Op::CartWrite))?;
        self.state
            .lock()
            .unwrap()
            .cart
            .retain(|l| l.user_id != principal.user_id);
        Ok(())
    }
}

#[async_trait]
impl WishlistStore for MemoryBackend {
    async fn wishlist_entries(
        &self,
        principal: &Principal,
    ) -> Result<Vec<WishlistEntry>, BackendError> {
        self.enter("wishlist_entries", Some(Op::WishlistRead))?;
        let state = self.state.lock().unwrap();
        Ok(state
            .wishlist
            .iter()
            .filter(|e| e.user_id == principal.user_id)
            .map(|e| WishlistEntry {
                product: Self::product(&state, e.product_id),
                ..e.clone()
            })
            .collect())
    }

    async fn add_wishlist_entry(
        &self,
        principal: &Principal,
        product_id: ProductId,
    ) -> Result<(), BackendError> {
        let _gate = self.wishlist_gate.lock().await;
        self.enter("add_wishlist_entry", Some(Op::WishlistWrite))?;
        let mut state = self.state.lock().unwrap();
        let present = state
            .wishlist
            .iter()
            .any(|e| e.user_id == principal.user_id && e.product_id == product_id);
        if !present {
            state.wishlist.push(WishlistEntry {
                id: WishlistEntryId::new_v4(),
                user_id: principal.user_id,
                product_id,
                created_at: Utc::now(),
                product: None,
            });
        }
        Ok(())
    }

    async fn remove_wishlist_entry(
        &self,
        principal: &Principal,
        product_id: ProductId,
    ) -> Result<(), BackendError> {
        let _gate = self.wishlist_gate.lock().await;
        self.enter("remove_wishlist_entry", Some(Op::WishlistWrite))?;
        self.state
            .lock()
            .unwrap()
            .wishlist
            .retain(|e| !(e.user_id == principal.user_id && e.product_id == product_id));
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryBackend {
    async fn orders(&self, principal: &Principal) -> Result<Vec<Order>, BackendError> {
        self.enter("orders", None)?;
        let state = self.state.lock().unwrap();
        let mut orders: Vec<Order> = state
            .orders
            .iter()
            .filter(|o| o.user_id == principal.user_id)
            .map(|o| Order {
                lines: state
                    .order_lines
                    .iter()
                    .filter(|l| l.order_id == o.id)
                    .map(|l| OrderLine {
                        product: Self::product(&state, l.product_id),
                        ..l.clone()
                    })
                    .collect(),
                ..o.clone()
            })
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn order_by_number(
        &self,
        principal: &Principal,
        order_number: &str,
    ) -> Result<Option<Order>, BackendError> {
        Ok(self
            .orders(principal)
            .await?
            .into_iter()
            .find(|o| o.order_number == order_number))
    }

    async fn generate_order_number(&self, _principal: &Principal) -> Result<String, BackendError> {
        self.enter("generate_order_number", Some(Op::OrderNumber))?;
        let mut state = self.state.lock().unwrap();
        state.order_counter += 1;
        Ok(format!("ORD-{:06}", state.order_counter))
    }

    async fn insert_order(
        &self,
        principal: &Principal,
        order: &NewOrder,
    ) -> Result<Order, BackendError> {
        self.enter("insert_order", Some(Op::InsertOrder))?;
        let stored = Order {
            id: OrderId::new_v4(),
            user_id: principal.user_id,
            order_number: order.order_number.clone(),
            total_amount: order.total_amount,
            status: OrderStatus::Pending,
            shipping_address: order.shipping_address.clone(),
            billing_address: order.billing_address.clone(),
            payment_method: Some(order.payment_method),
            created_at: Utc::now(),
            lines: vec![],
        };
        self.state.lock().unwrap().orders.push(stored.clone());
        Ok(stored)
    }

    async fn insert_order_lines(
        &self,
        _principal: &Principal,
        lines: &[NewOrderLine],
    ) -> Result<(), BackendError> {
        self.enter("insert_order_lines", Some(Op::InsertOrderLines))?;
        let mut state = self.state.lock().unwrap();
        for line in lines {
            state.order_lines.push(OrderLine {
                id: OrderLineId::new_v4(),
                order_id: line.order_id,
                product_id: line.product_id,
                quantity: line.quantity,
                size: line.size.clone(),
                color: line.color.clone(),
                price: line.price,
                product: None,
            });
        }
        Ok(())
    }

    async fn delete_order(&self, principal: &Principal, id: OrderId) -> Result<(), BackendError> {
        self.enter("delete_order", Some(Op::DeleteOrder))?;
        let mut state = self.state.lock().unwrap();
        state
            .orders
            .retain(|o| !(o.id == id && o.user_id == principal.user_id));
        state.order_lines.retain(|l| l.order_id != id);
        Ok(())
    }
}

#[async_trait]
impl AuthGateway for MemoryBackend {
    async fn sign_up_with_email(
        &self,
        email: &Email,
        password: &SecretString,
        full_name: &str,
        _redirect_to: &str,
    ) -> Result<SignUpOutcome, BackendError> {
        self.enter("sign_up_with_email", None)?;
        let mut state = self.state.lock().unwrap();
        if state.accounts.contains_key(email.as_str()) {
            return Err(BackendError::Api {
                status: 422,
                code: Some("user_already_exists".to_string()),
                message: "User already registered".to_string(),
            });
        }
        state.accounts.insert(
            email.as_str().to_string(),
            (
                UserId::new_v4(),
                Some(password.expose_secret().to_string()),
                Some(full_name.to_string()),
            ),
        );
        Ok(SignUpOutcome::ConfirmationSent)
    }

    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, BackendError> {
        self.enter("sign_in_with_password", Some(Op::SignIn))?;
        let state = self.state.lock().unwrap();
        match state.accounts.get(email.as_str()) {
            Some((id, Some(stored), full_name)) if stored == password.expose_secret() => {
                Ok(Self::session(AuthUser {
                    id: *id,
                    email: Some(email.as_str().to_string()),
                    phone: None,
                    full_name: full_name.clone(),
                }))
            }
            _ => Err(BackendError::Api {
                status: 400,
                code: Some("invalid_credentials".to_string()),
                message: "Invalid login credentials".to_string(),
            }),
        }
    }

    async fn send_phone_otp(
        &self,
        phone: &Phone,
        create_user: bool,
        full_name: Option<&str>,
    ) -> Result<(), BackendError> {
        self.enter("send_phone_otp", None)?;
        let mut state = self.state.lock().unwrap();
        let known = state.accounts.contains_key(phone.as_str());
        if !known && !create_user {
            return Err(BackendError::Api {
                status: 422,
                code: Some("otp_disabled".to_string()),
                message: "Signups not allowed for otp".to_string(),
            });
        }
        if !known {
            state.accounts.insert(
                phone.as_str().to_string(),
                (UserId::new_v4(), None, full_name.map(str::to_string)),
            );
        }
        state.otp_sent.push((phone.as_str().to_string(), create_user));
        Ok(())
    }

    async fn verify_phone_otp(
        &self,
        phone: &Phone,
        code: &str,
    ) -> Result<AuthSession, BackendError> {
        self.enter("verify_phone_otp", None)?;
        let state = self.state.lock().unwrap();
        let sent = state.otp_sent.iter().any(|(p, _)| p == phone.as_str());
        match state.accounts.get(phone.as_str()) {
            Some((id, _, full_name)) if sent && code == OTP_CODE => Ok(Self::session(AuthUser {
                id: *id,
                email: None,
                phone: Some(phone.as_str().to_string()),
                full_name: full_name.clone(),
            })),
            _ => Err(BackendError::Api {
                status: 400,
                code: Some("otp_expired".to_string()),
                message: "Token has expired or is invalid".to_string(),
            }),
        }
    }

    async fn exchange_code(
        &self,
        auth_code: &str,
        code_verifier: &str,
    ) -> Result<AuthSession, BackendError> {
        self.enter("exchange_code", None)?;
        if auth_code != OAUTH_CODE || code_verifier.len() < 43 {
            return Err(BackendError::Api {
                status: 400,
                code: Some("bad_code_verifier".to_string()),
                message: "invalid flow state".to_string(),
            });
        }
        Ok(Self::session(AuthUser {
            id: UserId::new_v4(),
            email: Some("social@example.com".to_string()),
            phone: None,
            full_name: Some("Social Shopper".to_string()),
        }))
    }

    async fn refresh_session(
        &self,
        _refresh_token: &SecretString,
    ) -> Result<AuthSession, BackendError> {
        self.enter("refresh_session", None)?;
        Ok(Self::session(AuthUser {
            id: UserId::new_v4(),
            email: None,
            phone: None,
            full_name: None,
        }))
    }

    async fn sign_out(&self, _access_token: &SecretString) -> Result<(), BackendError> {
        self.enter("sign_out", None)?;
        self.state.lock().unwrap().signed_out += 1;
        Ok(())
    }

    fn authorize_url(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
        code_challenge: &str,
    ) -> String {
        format!(
            "https://auth.test/authorize?provider={}&redirect_to={redirect_to}&code_challenge={code_challenge}",
            provider.as_str()
        )
    }
}
