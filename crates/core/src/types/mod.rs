//! Core types for Atelier.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod address;
pub mod email;
pub mod id;
pub mod phone;
pub mod price;
pub mod quantity;
pub mod status;

pub use address::{AddressError, AddressLabel, ShippingAddress};
pub use email::{Email, EmailError};
pub use id::*;
pub use phone::{Phone, PhoneError};
pub use price::{CurrencyCode, Price};
pub use quantity::{Quantity, QuantityError};
pub use status::*;
