//! Per-session address book.
//!
//! Exactly one address is the default whenever the book is non-empty, and the
//! last remaining address cannot be deleted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use atelier_core::{AddressId, ShippingAddress};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressBookError {
    #[error("address not found")]
    NotFound,

    #[error("you need at least one address")]
    LastAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressEntry {
    pub id: AddressId,
    pub address: ShippingAddress,
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBook {
    entries: Vec<AddressEntry>,
}

impl AddressBook {
    #[must_use]
    pub fn entries(&self) -> &[AddressEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: AddressId) -> Option<&AddressEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// The address used to pre-fill checkout.
    #[must_use]
    pub fn default_entry(&self) -> Option<&AddressEntry> {
        self.entries.iter().find(|e| e.is_default)
    }

    /// Whether the delete control should be offered.
    #[must_use]
    pub fn can_delete(&self) -> bool {
        self.entries.len() > 1
    }

    /// Add an address. The first address becomes the default; `make_default`
    /// moves the default to the new one.
    pub fn add(&mut self, address: ShippingAddress, make_default: bool) -> AddressId {
        let id = AddressId::new_v4();
        let is_default = make_default || self.entries.is_empty();
        if is_default {
            self.clear_default();
        }
        self.entries.push(AddressEntry {
            id,
            address,
            is_default,
        });
        id
    }

    /// Replace the address stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn update(
        &mut self,
        id: AddressId,
        address: ShippingAddress,
    ) -> Result<(), AddressBookError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(AddressBookError::NotFound)?;
        entry.address = address;
        Ok(())
    }

    /// Delete an address. Deleting the default promotes the first remaining
    /// address.
    ///
    /// # Errors
    ///
    /// Returns `LastAddress` when only one address is left, `NotFound` for an
    /// unknown id.
    pub fn delete(&mut self, id: AddressId) -> Result<(), AddressBookError> {
        let index = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or(AddressBookError::NotFound)?;
        if self.entries.len() == 1 {
            return Err(AddressBookError::LastAddress);
        }
        let removed = self.entries.remove(index);
        if removed.is_default
            && let Some(first) = self.entries.first_mut()
        {
            first.is_default = true;
        }
        Ok(())
    }

    /// Make `id` the only default.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn set_default(&mut self, id: AddressId) -> Result<(), AddressBookError> {
        if self.get(id).is_none() {
            return Err(AddressBookError::NotFound);
        }
        for entry in &mut self.entries {
            entry.is_default = entry.id == id;
        }
        Ok(())
    }

    fn clear_default(&mut self) {
        for entry in &mut self.entries {
            entry.is_default = false;
        }
    }
}
