//! Synchronization service error types.

use thiserror::Error;

use atelier_core::{ProductId, QuantityError};

use crate::backend::BackendError;

/// Errors from the catalog, cart, wishlist, and order services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The backend call failed; nothing cached was changed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Quantities start at one.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(#[from] QuantityError),

    /// Another change to the same wishlist product has not finished yet.
    #[error("a change to product {0} is already in progress")]
    Busy(ProductId),

    /// Checkout was attempted with nothing to buy.
    #[error("an order needs at least one item")]
    EmptyOrder,

    /// Line insertion failed and the order row was rolled back.
    #[error("order {order_number} could not be completed: {source}")]
    OrderLinesFailed {
        order_number: String,
        #[source]
        source: BackendError,
    },

    /// Line insertion failed and so did the rollback: the order row exists
    /// with no lines.
    #[error("order {order_number} was left without items: {source}")]
    OrphanedOrder {
        order_number: String,
        #[source]
        source: BackendError,
    },
}

/// Shopper-facing wording for a rejected quantity.
#[must_use]
pub const fn quantity_message(error: QuantityError) -> &'static str {
    match error {
        QuantityError::Zero => "Quantity must be at least 1",
        QuantityError::TooLarge(_) => "You can add at most 99 of an item",
    }
}

impl ServiceError {
    /// Message safe to show in a notification.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Backend(e) => e.user_message(),
            Self::InvalidQuantity(e) => quantity_message(*e).to_string(),
            Self::Busy(_) => "Please wait, still saving your last change".to_string(),
            Self::EmptyOrder => "Your cart is empty".to_string(),
            Self::OrderLinesFailed { .. } => {
                "We couldn't place your order. You have not been charged, please try again."
                    .to_string()
            }
            Self::OrphanedOrder { order_number, .. } => format!(
                "Something went wrong with order {order_number}. Please contact support."
            ),
        }
    }
}
