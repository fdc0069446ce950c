//! Status and tag enums for orders.

use serde::{Deserialize, Serialize};

/// Order lifecycle status, as stored in the `orders.status` column.
///
/// The storefront never writes a status other than the backend default
/// (`pending`); fulfilment moves it forward on the backend side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
}

/// One row of the tracking timeline shown on the track-order page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingStep {
    /// Step label.
    pub label: &'static str,
    /// Whether the order has reached this step.
    pub completed: bool,
}

impl OrderStatus {
    /// The linear fulfilment timeline, in order.
    const TIMELINE: [&'static str; 5] = [
        "Order Placed",
        "Order Confirmed",
        "Shipped",
        "Out for Delivery",
        "Delivered",
    ];

    /// Human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Order Placed",
            Self::Confirmed => "Order Confirmed",
            Self::Processing => "Processing",
            Self::Shipped => "In Transit",
            Self::OutForDelivery => "Out for Delivery",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Position on the fulfilment timeline. `Processing` sits with
    /// `Confirmed`; `Cancelled` is off the timeline.
    const fn rank(self) -> Option<usize> {
        match self {
            Self::Pending => Some(0),
            Self::Confirmed | Self::Processing => Some(1),
            Self::Shipped => Some(2),
            Self::OutForDelivery => Some(3),
            Self::Delivered => Some(4),
            Self::Cancelled => None,
        }
    }

    /// Tracking timeline with every step up to the current one completed.
    ///
    /// A cancelled order only shows the placement step.
    #[must_use]
    pub fn tracking_steps(&self) -> Vec<TrackingStep> {
        let reached = self.rank();
        Self::TIMELINE
            .iter()
            .enumerate()
            .map(|(i, &label)| TrackingStep {
                label,
                completed: reached.map_or(i == 0, |r| i <= r),
            })
            .collect()
    }
}

/// How the shopper chose to pay. Stored as a free-form tag on the order row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Card,
    Upi,
    NetBanking,
    CashOnDelivery,
}

impl PaymentMethod {
    /// All methods offered at checkout.
    pub const ALL: [Self; 4] = [Self::Card, Self::Upi, Self::NetBanking, Self::CashOnDelivery];

    /// Tag as stored on the order row.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Upi => "upi",
            Self::NetBanking => "net_banking",
            Self::CashOnDelivery => "cash_on_delivery",
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Card => "Credit / Debit Card",
            Self::Upi => "UPI",
            Self::NetBanking => "Net Banking",
            Self::CashOnDelivery => "Cash on Delivery",
        }
    }
}
