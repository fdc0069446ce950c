//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `catalog` - Product and category reads (cached, read-only)
//! - `cart` - Cart synchronization over the `cart` collection
//! - `wishlist` - Wishlist synchronization with a per-product in-flight guard
//! - `orders` - Checkout (order + lines with compensation) and tracking
//! - `auth` - Email, phone OTP, and social sign-in
//! - `addresses` - Session address book
//!
//! Cart and wishlist views are cached per user and never updated
//! speculatively: a write is sent, and only after it succeeds is the cached
//! view dropped and refetched.

pub mod addresses;
pub mod auth;
pub mod cart;
pub mod catalog;
mod error;
pub mod orders;
pub mod wishlist;

pub use addresses::{AddressBook, AddressBookError, AddressEntry};
pub use auth::{
    AuthError, AuthEvent, AuthService, EmailSignUp, OAuthStart, OtpPurpose, PendingOtp,
};
pub use cart::{AddPolicy, CartItem, CartService, CartSummary};
pub use catalog::{CatalogService, DeliveryQuote, ProductFilter};
pub use error::{ServiceError, quantity_message};
pub use orders::{Checkout, CheckoutItem, OrderService};
pub use wishlist::{Toggled, WishlistService, WishlistSnapshot};
