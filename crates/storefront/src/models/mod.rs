//! Session-held models for the storefront.
//!
//! - [`session`] - signed-in user and session keys
//! - [`flash`] - one-shot notifications shown on the next render

pub mod flash;
pub mod session;

pub use flash::{Flash, FlashKind};
pub use session::{CurrentUser, keys as session_keys};
