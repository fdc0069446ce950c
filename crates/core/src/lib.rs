//! Atelier Core - Shared domain types.
//!
//! This crate provides the types shared by the Atelier storefront:
//! - typed row identifiers for every backend collection
//! - prices, quantities, and order totals
//! - validated contact data (email, phone) and shipping addresses
//! - order status and payment method tags
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no HTTP
//! clients, no knowledge of the hosted backend. All persistence lives behind
//! the storefront's backend client.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, prices, contact data, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
