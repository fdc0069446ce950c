//! Session-related types.
//!
//! Types stored in the session for authentication state.

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use atelier_core::UserId;

use crate::backend::{AuthSession, Principal};

/// Refresh the access token when it has less than this left.
const REFRESH_MARGIN_SECONDS: i64 = 60;

/// Session-stored signed-in user.
///
/// Holds the backend tokens so requests can be made on the user's behalf.
/// Sessions live in server memory; the cookie only carries the session id.
/// Implements `Debug` manually to redact the tokens.
#[derive(Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    /// Backend user id.
    pub id: UserId,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub full_name: Option<String>,
    access_token: String,
    refresh_token: String,
    /// When the access token stops being accepted.
    pub expires_at: DateTime<Utc>,
}

impl CurrentUser {
    /// Capture a fresh sign-in.
    #[must_use]
    pub fn from_auth(session: &AuthSession) -> Self {
        use secrecy::ExposeSecret;

        Self {
            id: session.user.id,
            email: session.user.email.clone(),
            phone: session.user.phone.clone(),
            full_name: session.user.full_name.clone(),
            access_token: session.access_token.expose_secret().to_string(),
            refresh_token: session.refresh_token.expose_secret().to_string(),
            expires_at: session.expires_at,
        }
    }

    /// Take the new tokens from a refresh, keeping the profile.
    pub fn apply_refresh(&mut self, session: &AuthSession) {
        use secrecy::ExposeSecret;

        self.access_token = session.access_token.expose_secret().to_string();
        self.refresh_token = session.refresh_token.expose_secret().to_string();
        self.expires_at = session.expires_at;
    }

    /// Credentials for row requests on this user's behalf.
    #[must_use]
    pub fn principal(&self) -> Principal {
        Principal::new(self.id, SecretString::from(self.access_token.clone()))
    }

    #[must_use]
    pub fn access_token(&self) -> SecretString {
        SecretString::from(self.access_token.clone())
    }

    #[must_use]
    pub fn refresh_token(&self) -> SecretString {
        SecretString::from(self.refresh_token.clone())
    }

    /// Whether the access token is expired or about to be.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now < Duration::seconds(REFRESH_MARGIN_SECONDS)
    }

    /// Name for the header greeting.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.email.as_deref())
            .or(self.phone.as_deref())
            .unwrap_or("Account")
    }
}

impl std::fmt::Debug for CurrentUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurrentUser")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("phone", &self.phone)
            .field("full_name", &self.full_name)
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Session keys.
pub mod keys {
    /// Key for storing the current signed-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for pending notifications.
    pub const FLASH: &str = "flash";

    /// Key for a phone verification waiting for its code.
    pub const PENDING_OTP: &str = "pending_otp";

    /// Key for the PKCE verifier of a social sign-in in progress.
    pub const OAUTH_VERIFIER: &str = "oauth_verifier";

    /// Key for the address book.
    pub const ADDRESS_BOOK: &str = "address_book";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::AuthUser;

    fn auth_session(expires_in: i64) -> AuthSession {
        AuthSession {
            access_token: SecretString::from("access-secret"),
            refresh_token: SecretString::from("refresh-secret"),
            expires_at: Utc::now() + Duration::seconds(expires_in),
            user: AuthUser {
                id: UserId::new_v4(),
                email: Some("asha@example.com".to_string()),
                phone: None,
                full_name: None,
            },
        }
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let user = CurrentUser::from_auth(&auth_session(3600));
        let debug = format!("{user:?}");
        assert!(!debug.contains("access-secret"));
        assert!(!debug.contains("refresh-secret"));
        assert!(debug.contains("asha@example.com"));
    }

    #[test]
    fn test_needs_refresh_near_expiry() {
        let now = Utc::now();
        assert!(!CurrentUser::from_auth(&auth_session(3600)).needs_refresh(now));
        assert!(CurrentUser::from_auth(&auth_session(30)).needs_refresh(now));
        assert!(CurrentUser::from_auth(&auth_session(-10)).needs_refresh(now));
    }

    #[test]
    fn test_display_name_falls_back_to_email() {
        let user = CurrentUser::from_auth(&auth_session(3600));
        assert_eq!(user.display_name(), "asha@example.com");
    }
}
