//! Store trait implementations over the row interface.

use async_trait::async_trait;
use serde::Serialize;
use tracing::instrument;

use atelier_core::{CartLineId, OrderId, ProductId, UserId};

use super::{
    BackendClient, BackendError, CartLine, CartLineUpdate, CartStore, CatalogStore, Category,
    Conflict, NewCartLine, NewOrder, NewOrderLine, Order, OrderStore, Principal, Product,
    ProductQuery, RowQuery, WishlistEntry, WishlistStore,
};

/// One cart line per (user, product, size, color).
const CART_CONFLICT: Conflict = Conflict::Merge("user_id,product_id,size,color");
/// One wishlist entry per (user, product).
const WISHLIST_CONFLICT: Conflict = Conflict::Ignore("user_id,product_id");

const ORDER_WITH_LINES: &str = "*,order_items(*,products(*))";

#[async_trait]
impl CatalogStore for BackendClient {
    #[instrument(skip(self))]
    async fn list_products(&self, query: &ProductQuery) -> Result<Vec<Product>, BackendError> {
        let mut rows = RowQuery::table("products").eq("is_active", true);

        rows = match &query.category_slug {
            // `!inner` drops products whose embedded category does not match
            Some(slug) => rows
                .select("*,categories!inner(*)")
                .eq("categories.slug", slug),
            None => rows.select("*,categories(*)"),
        };
        if query.featured_only {
            rows = rows.eq("is_featured", true);
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            rows = rows.ilike_any(&["name", "description"], search);
        }
        if let Some(min) = query.min_price {
            rows = rows.gte("price", min);
        }
        if let Some(max) = query.max_price {
            rows = rows.lte("price", max);
        }
        if !query.sizes.is_empty() {
            rows = rows.overlaps("sizes", &query.sizes);
        }
        if !query.colors.is_empty() {
            rows = rows.overlaps("colors", &query.colors);
        }
        rows = rows.order("created_at", false);
        if let Some(limit) = query.limit {
            rows = rows.limit(limit);
        }

        self.select(None, &rows).await
    }

    #[instrument(skip(self), fields(product_id = %id))]
    async fn get_product(&self, id: ProductId) -> Result<Product, BackendError> {
        let query = RowQuery::table("products")
            .select("*,categories(*)")
            .eq("id", id)
            .eq("is_active", true);
        self.select_single(None, &query).await
    }

    #[instrument(skip(self))]
    async fn list_categories(&self) -> Result<Vec<Category>, BackendError> {
        let query = RowQuery::table("categories").select("*").order("name", true);
        self.select(None, &query).await
    }
}

#[async_trait]
impl CartStore for BackendClient {
    #[instrument(skip(self), fields(user_id = %principal.user_id))]
    async fn cart_lines(&self, principal: &Principal) -> Result<Vec<CartLine>, BackendError> {
        let query = RowQuery::table("cart")
            .select("*,products(*)")
            .eq("user_id", principal.user_id)
            .order("created_at", true);
        self.select(Some(principal), &query).await
    }

    #[instrument(skip(self, line), fields(user_id = %principal.user_id, product_id = %line.product_id))]
    async fn upsert_cart_line(
        &self,
        principal: &Principal,
        line: &NewCartLine,
    ) -> Result<(), BackendError> {
        self.upsert(principal, "cart", line, CART_CONFLICT).await
    }

    #[instrument(skip(self, changes), fields(user_id = %principal.user_id, line_id = %id))]
    async fn update_cart_line(
        &self,
        principal: &Principal,
        id: CartLineId,
        changes: &CartLineUpdate,
    ) -> Result<(), BackendError> {
        let query = RowQuery::table("cart").eq("id", id);
        self.update(principal, &query, changes).await
    }

    #[instrument(skip(self), fields(user_id = %principal.user_id, line_id = %id))]
    async fn delete_cart_line(
        &self,
        principal: &Principal,
        id: CartLineId,
    ) -> Result<(), BackendError> {
        let query = RowQuery::table("cart").eq("id", id);
        self.delete(principal, &query).await
    }

    #[instrument(skip(self), fields(user_id = %principal.user_id))]
    async fn clear_cart(&self, principal: &Principal) -> Result<(), BackendError> {
        let query = RowQuery::table("cart").eq("user_id", principal.user_id);
        self.delete(principal, &query).await
    }
}

#[derive(Serialize)]
struct NewWishlistEntry {
    user_id: UserId,
    product_id: ProductId,
}

#[async_trait]
impl WishlistStore for BackendClient {
    #[instrument(skip(self), fields(user_id = %principal.user_id))]
    async fn wishlist_entries(
        &self,
        principal: &Principal,
    ) -> Result<Vec<WishlistEntry>, BackendError> {
        let query = RowQuery::table("wishlist")
            .select("*,products(*)")
            .eq("user_id", principal.user_id)
            .order("created_at", false);
        self.select(Some(principal), &query).await
    }

    #[instrument(skip(self), fields(user_id = %principal.user_id, product_id = %product_id))]
    async fn add_wishlist_entry(
        &self,
        principal: &Principal,
        product_id: ProductId,
    ) -> Result<(), BackendError> {
        let entry = NewWishlistEntry {
            user_id: principal.user_id,
            product_id,
        };
        self.upsert(principal, "wishlist", &entry, WISHLIST_CONFLICT)
            .await
    }

    #[instrument(skip(self), fields(user_id = %principal.user_id, product_id = %product_id))]
    async fn remove_wishlist_entry(
        &self,
        principal: &Principal,
        product_id: ProductId,
    ) -> Result<(), BackendError> {
        let query = RowQuery::table("wishlist")
            .eq("user_id", principal.user_id)
            .eq("product_id", product_id);
        self.delete(principal, &query).await
    }
}

#[async_trait]
impl OrderStore for BackendClient {
    #[instrument(skip(self), fields(user_id = %principal.user_id))]
    async fn orders(&self, principal: &Principal) -> Result<Vec<Order>, BackendError> {
        let query = RowQuery::table("orders")
            .select(ORDER_WITH_LINES)
            .eq("user_id", principal.user_id)
            .order("created_at", false);
        self.select(Some(principal), &query).await
    }

    #[instrument(skip(self), fields(user_id = %principal.user_id))]
    async fn order_by_number(
        &self,
        principal: &Principal,
        order_number: &str,
    ) -> Result<Option<Order>, BackendError> {
        let query = RowQuery::table("orders")
            .select(ORDER_WITH_LINES)
            .eq("user_id", principal.user_id)
            .eq("order_number", order_number)
            .limit(1);
        let rows: Vec<Order> = self.select(Some(principal), &query).await?;
        Ok(rows.into_iter().next())
    }

    #[instrument(skip(self), fields(user_id = %principal.user_id))]
    async fn generate_order_number(&self, principal: &Principal) -> Result<String, BackendError> {
        self.rpc(principal, "generate_order_number", &serde_json::json!({}))
            .await
    }

    #[instrument(skip(self, order), fields(user_id = %principal.user_id, order_number = %order.order_number))]
    async fn insert_order(
        &self,
        principal: &Principal,
        order: &NewOrder,
    ) -> Result<Order, BackendError> {
        self.insert_returning(principal, "orders", order).await
    }

    #[instrument(skip(self, lines), fields(user_id = %principal.user_id, count = lines.len()))]
    async fn insert_order_lines(
        &self,
        principal: &Principal,
        lines: &[NewOrderLine],
    ) -> Result<(), BackendError> {
        self.insert(principal, "order_items", lines).await
    }

    #[instrument(skip(self), fields(user_id = %principal.user_id, order_id = %id))]
    async fn delete_order(&self, principal: &Principal, id: OrderId) -> Result<(), BackendError> {
        let query = RowQuery::table("orders").eq("id", id);
        self.delete(principal, &query).await
    }
}
