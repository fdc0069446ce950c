//! Line item quantity.

use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Quantity`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityError {
    /// Cart and order lines always carry at least one unit.
    #[error("quantity must be at least 1")]
    Zero,
    /// More units than one line may hold.
    #[error("quantity must be at most 99, got {0}")]
    TooLarge(u32),
}

/// Number of units on a cart or order line.
///
/// ## Constraints
///
/// - Always `>= 1`. Removing a line is a separate operation, never a
///   quantity of zero.
/// - At most [`Quantity::MAX`], so line totals and cart counts stay small.
///
/// ```
/// use atelier_core::Quantity;
///
/// assert_eq!(Quantity::new(2).unwrap().get(), 2);
/// assert!(Quantity::new(0).is_err());
/// assert!(Quantity::new(100).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// A single unit.
    pub const ONE: Self = Self(1);
    /// The most units a single line may hold.
    pub const MAX: Self = Self(99);

    /// Create a quantity.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError::Zero`] for `0` and
    /// [`QuantityError::TooLarge`] above [`Quantity::MAX`].
    pub const fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 {
            return Err(QuantityError::Zero);
        }
        if value > Self::MAX.0 {
            return Err(QuantityError::TooLarge(value));
        }
        Ok(Self(value))
    }

    /// Create a quantity, clamping anything above [`Quantity::MAX`].
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError::Zero`] for `0`.
    pub const fn saturating(value: u32) -> Result<Self, QuantityError> {
        if value > Self::MAX.0 {
            return Ok(Self::MAX);
        }
        Self::new(value)
    }

    /// Get the number of units.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self {
        q.0
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}
