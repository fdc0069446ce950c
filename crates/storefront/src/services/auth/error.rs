//! Authentication error types.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] atelier_core::EmailError),

    /// Invalid phone number format.
    #[error("invalid phone: {0}")]
    InvalidPhone(#[from] atelier_core::PhoneError),

    /// Sign-up requires a name.
    #[error("full name is required")]
    MissingName,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Password and confirmation differ.
    #[error("passwords do not match")]
    PasswordMismatch,

    /// One-time codes are exactly six digits.
    #[error("verification code must be 6 digits")]
    MalformedCode,

    /// OAuth callback without a matching pending sign-in.
    #[error("invalid session state")]
    InvalidSessionState,

    /// The auth backend rejected the request or could not be reached.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl AuthError {
    /// Message safe to show on the login page.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidEmail(_) => "Please enter a valid email address".to_string(),
            Self::InvalidPhone(_) => {
                "Please enter a valid phone number with country code (e.g. +91 98765 43210)"
                    .to_string()
            }
            Self::MissingName => "Please enter your full name".to_string(),
            Self::WeakPassword(reason) => reason.clone(),
            Self::PasswordMismatch => "Passwords don't match".to_string(),
            Self::MalformedCode => "Please enter a valid 6-digit OTP".to_string(),
            Self::InvalidSessionState => "Sign-in expired, please try again".to_string(),
            Self::Backend(e) => e.user_message(),
        }
    }

    /// Whether the failure is the shopper's input rather than the service.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        !matches!(self, Self::Backend(_))
    }
}
