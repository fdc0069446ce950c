//! Shipping address record.
//!
//! Orders store the address as a JSON column. The storefront always writes
//! this exact shape, so the column never holds an open-ended map.

use serde::{Deserialize, Serialize};

use crate::types::phone::{Phone, PhoneError};

/// Errors that can occur when validating a [`ShippingAddress`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// A required field is blank.
    #[error("{0} is required")]
    MissingField(&'static str),
    /// Postal codes are digits only.
    #[error("postal code must be 4-10 digits")]
    InvalidPostalCode,
    /// Contact phone failed validation.
    #[error("invalid phone: {0}")]
    InvalidPhone(#[from] PhoneError),
}

/// Kind of address, shown as an icon and label in the address book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AddressLabel {
    #[default]
    Home,
    Office,
    Other,
}

impl AddressLabel {
    /// Human-readable label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Home => "Home",
            Self::Office => "Office",
            Self::Other => "Other",
        }
    }
}

/// A validated delivery address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub label: AddressLabel,
    pub full_name: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub phone: Phone,
}

impl ShippingAddress {
    /// Build an address from raw form input, trimming every field.
    ///
    /// # Errors
    ///
    /// Returns an [`AddressError`] for the first blank required field, a
    /// non-numeric postal code, or an invalid phone number.
    pub fn parse(
        label: AddressLabel,
        full_name: &str,
        street: &str,
        city: &str,
        state: &str,
        postal_code: &str,
        phone: &str,
    ) -> Result<Self, AddressError> {
        let required = |value: &str, field: &'static str| {
            let value = value.trim();
            if value.is_empty() {
                Err(AddressError::MissingField(field))
            } else {
                Ok(value.to_owned())
            }
        };

        let full_name = required(full_name, "name")?;
        let street = required(street, "street address")?;
        let city = required(city, "city")?;
        let state = required(state, "state")?;
        let postal_code = required(postal_code, "postal code")?;
        if !(4..=10).contains(&postal_code.len()) || !postal_code.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(AddressError::InvalidPostalCode);
        }
        let phone = Phone::parse(phone)?;

        Ok(Self {
            label,
            full_name,
            street,
            city,
            state,
            postal_code,
            phone,
        })
    }

    /// Single-line `City, State 123456` summary.
    #[must_use]
    pub fn locality(&self) -> String {
        format!("{}, {} {}", self.city, self.state, self.postal_code)
    }
}
