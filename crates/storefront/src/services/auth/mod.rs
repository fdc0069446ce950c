//! Authentication service.
//!
//! Email/password, phone one-time code, and social (PKCE) sign-in against the
//! hosted auth interface. Input is validated before any network call.
//!
//! Phone sign-up and phone sign-in send the same SMS code and both verify
//! with the `sms` verification type. What differs is whether an unknown
//! number may create an account, so the purpose travels with the pending
//! verification and a resend repeats the original request.

mod error;

pub use error::AuthError;

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use atelier_core::{Email, Phone, UserId};

use crate::backend::{AuthGateway, AuthSession, OAuthProvider, SignUpOutcome};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 6;

/// Length of SMS one-time codes.
const OTP_LENGTH: usize = 6;

/// Why a phone code was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    /// Registering a new account.
    SignUp,
    /// Signing in to an existing account.
    SignIn,
}

impl OtpPurpose {
    /// Whether an unknown number may create an account.
    #[must_use]
    pub const fn creates_user(&self) -> bool {
        matches!(self, Self::SignUp)
    }
}

/// A phone verification waiting for its code, kept in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOtp {
    pub phone: Phone,
    pub purpose: OtpPurpose,
    pub full_name: Option<String>,
}

/// Auth state changes, broadcast to whoever listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(UserId),
    SignedOut(UserId),
    TokenRefreshed(UserId),
}

/// PKCE verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    /// 32 random bytes, base64url encoded (43 characters).
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        let challenge = Self::challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }

    #[must_use]
    pub fn challenge_for(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }
}

/// Where to send the browser, and the verifier to keep until it returns.
#[derive(Debug, Clone)]
pub struct OAuthStart {
    pub url: String,
    pub verifier: String,
}

/// Email registration form input.
#[derive(Debug, Clone)]
pub struct EmailSignUp {
    pub full_name: String,
    pub email: String,
    pub password: SecretString,
    pub confirm_password: SecretString,
}

/// Authentication service.
#[derive(Clone)]
pub struct AuthService {
    gateway: Arc<dyn AuthGateway>,
    events: broadcast::Sender<AuthEvent>,
    base_url: String,
}

impl AuthService {
    /// Create a new authentication service. `base_url` is this storefront's
    /// public origin, used to build redirect targets.
    #[must_use]
    pub fn new(gateway: Arc<dyn AuthGateway>, base_url: &str) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            gateway,
            events,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Receive every subsequent [`AuthEvent`].
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: AuthEvent) {
        // No listeners is fine
        let _ = self.events.send(event);
    }

    fn signed_in(&self, session: AuthSession) -> AuthSession {
        info!(user_id = %session.user.id, "Signed in");
        self.emit(AuthEvent::SignedIn(session.user.id));
        session
    }

    // =========================================================================
    // Email
    // =========================================================================

    /// Register with email and password.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank name, bad email, short
    /// password, or mismatched confirmation, or `Backend` if registration is
    /// refused.
    #[instrument(skip_all)]
    pub async fn sign_up_with_email(&self, form: EmailSignUp) -> Result<SignUpOutcome, AuthError> {
        let full_name = form.full_name.trim();
        if full_name.is_empty() {
            return Err(AuthError::MissingName);
        }
        let email = Email::parse(&form.email)?;
        validate_password(form.password.expose_secret())?;
        if form.password.expose_secret() != form.confirm_password.expose_secret() {
            return Err(AuthError::PasswordMismatch);
        }

        let redirect_to = format!("{}/", self.base_url);
        let outcome = self
            .gateway
            .sign_up_with_email(&email, &form.password, full_name, &redirect_to)
            .await?;

        Ok(match outcome {
            SignUpOutcome::SignedIn(session) => SignUpOutcome::SignedIn(self.signed_in(session)),
            SignUpOutcome::ConfirmationSent => SignUpOutcome::ConfirmationSent,
        })
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEmail` for a malformed address, or `Backend` for wrong
    /// credentials.
    #[instrument(skip_all)]
    pub async fn sign_in_with_email(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<AuthSession, AuthError> {
        let email = Email::parse(email)?;
        if password.expose_secret().is_empty() {
            return Err(AuthError::WeakPassword("Please enter your password".to_string()));
        }
        let session = self.gateway.sign_in_with_password(&email, password).await?;
        Ok(self.signed_in(session))
    }

    // =========================================================================
    // Phone
    // =========================================================================

    /// Send an SMS code for sign-up or sign-in.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPhone` for a malformed number, `MissingName` for a
    /// sign-up without a name, or `Backend` if the code cannot be sent.
    #[instrument(skip(self, phone, full_name))]
    pub async fn start_phone(
        &self,
        purpose: OtpPurpose,
        phone: &str,
        full_name: Option<&str>,
    ) -> Result<PendingOtp, AuthError> {
        let phone = Phone::parse(phone)?;
        let full_name = full_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        if purpose == OtpPurpose::SignUp && full_name.is_none() {
            return Err(AuthError::MissingName);
        }

        let pending = PendingOtp {
            phone,
            purpose,
            full_name,
        };
        self.send_code(&pending).await?;
        Ok(pending)
    }

    /// Send the code again for the same purpose.
    ///
    /// # Errors
    ///
    /// Returns `Backend` if the code cannot be sent.
    #[instrument(skip_all, fields(purpose = ?pending.purpose))]
    pub async fn resend_otp(&self, pending: &PendingOtp) -> Result<(), AuthError> {
        self.send_code(pending).await
    }

    async fn send_code(&self, pending: &PendingOtp) -> Result<(), AuthError> {
        self.gateway
            .send_phone_otp(
                &pending.phone,
                pending.purpose.creates_user(),
                pending.full_name.as_deref(),
            )
            .await?;
        info!(phone = %pending.phone.masked(), purpose = ?pending.purpose, "Verification code sent");
        Ok(())
    }

    /// Exchange the SMS code for a session.
    ///
    /// # Errors
    ///
    /// Returns `MalformedCode` unless the code is exactly six digits, or
    /// `Backend` for a wrong or expired code.
    #[instrument(skip_all, fields(purpose = ?pending.purpose))]
    pub async fn verify_otp(
        &self,
        pending: &PendingOtp,
        code: &str,
    ) -> Result<AuthSession, AuthError> {
        let code = code.trim();
        if code.len() != OTP_LENGTH || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AuthError::MalformedCode);
        }
        let session = self.gateway.verify_phone_otp(&pending.phone, code).await?;
        Ok(self.signed_in(session))
    }

    // =========================================================================
    // Social
    // =========================================================================

    /// Begin a social sign-in: the browser goes to `url`, the `verifier`
    /// stays in the session until the callback.
    #[must_use]
    pub fn start_oauth(&self, provider: OAuthProvider) -> OAuthStart {
        let pkce = PkcePair::generate();
        let redirect_to = format!("{}/auth/callback", self.base_url);
        OAuthStart {
            url: self
                .gateway
                .authorize_url(provider, &redirect_to, &pkce.challenge),
            verifier: pkce.verifier,
        }
    }

    /// Finish a social sign-in.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSessionState` without a stored verifier, or `Backend`
    /// if the code exchange fails.
    #[instrument(skip_all)]
    pub async fn complete_oauth(
        &self,
        code: &str,
        verifier: Option<&str>,
    ) -> Result<AuthSession, AuthError> {
        let verifier = verifier.ok_or(AuthError::InvalidSessionState)?;
        let session = self.gateway.exchange_code(code, verifier).await?;
        Ok(self.signed_in(session))
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Trade a refresh token for fresh tokens.
    ///
    /// # Errors
    ///
    /// Returns `Backend` if the refresh token was rejected.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &SecretString) -> Result<AuthSession, AuthError> {
        let session = self.gateway.refresh_session(refresh_token).await?;
        self.emit(AuthEvent::TokenRefreshed(session.user.id));
        Ok(session)
    }

    /// Revoke the session. Listeners are told the user signed out even if
    /// the backend could not be reached.
    #[instrument(skip(self, access_token))]
    pub async fn sign_out(&self, user_id: UserId, access_token: &SecretString) {
        if let Err(e) = self.gateway.sign_out(access_token).await {
            warn!(error = %e, "Backend sign-out failed");
        }
        self.emit(AuthEvent::SignedOut(user_id));
    }
}

/// Validate password strength.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryBackend, OAUTH_CODE, OTP_CODE, Op};

    fn service() -> (Arc<MemoryBackend>, AuthService) {
        let backend = Arc::new(MemoryBackend::new());
        let auth = AuthService::new(backend.clone(), "http://localhost:3000/");
        (backend, auth)
    }

    fn secret(s: &str) -> SecretString {
        SecretString::from(s)
    }

    fn sign_up_form(password: &str, confirm: &str) -> EmailSignUp {
        EmailSignUp {
            full_name: "Asha Rao".to_string(),
            email: "asha@example.com".to_string(),
            password: secret(password),
            confirm_password: secret(confirm),
        }
    }

    #[tokio::test]
    async fn test_validation_runs_before_network() {
        let (backend, auth) = service();

        assert!(matches!(
            auth.sign_up_with_email(sign_up_form("secret1", "secret2")).await,
            Err(AuthError::PasswordMismatch)
        ));
        assert!(matches!(
            auth.sign_up_with_email(sign_up_form("abc", "abc")).await,
            Err(AuthError::WeakPassword(_))
        ));
        assert!(matches!(
            auth.sign_in_with_email("not-an-email", &secret("secret1")).await,
            Err(AuthError::InvalidEmail(_))
        ));
        assert!(matches!(
            auth.start_phone(OtpPurpose::SignIn, "98765", None).await,
            Err(AuthError::InvalidPhone(_))
        ));
        assert!(matches!(
            auth.start_phone(OtpPurpose::SignUp, "+919876543210", Some("  "))
                .await,
            Err(AuthError::MissingName)
        ));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_email_sign_in_emits_event() {
        let (backend, auth) = service();
        let user_id = backend.register("asha@example.com", "secret1");
        let mut events = auth.subscribe();

        let session = auth
            .sign_in_with_email(" asha@example.com ", &secret("secret1"))
            .await
            .unwrap();

        assert_eq!(session.user.id, user_id);
        assert_eq!(events.recv().await.unwrap(), AuthEvent::SignedIn(user_id));
    }

    #[tokio::test]
    async fn test_wrong_password_surfaces_backend_message() {
        let (backend, auth) = service();
        backend.register("asha@example.com", "secret1");
        let err = auth
            .sign_in_with_email("asha@example.com", &secret("wrong-one"))
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Invalid login credentials");
        assert!(!err.is_validation());
    }

    #[tokio::test]
    async fn test_sign_up_sends_confirmation() {
        let (_, auth) = service();
        let outcome = auth
            .sign_up_with_email(sign_up_form("secret1", "secret1"))
            .await
            .unwrap();
        assert!(matches!(outcome, SignUpOutcome::ConfirmationSent));
    }

    #[tokio::test]
    async fn test_phone_sign_up_then_verify() {
        let (backend, auth) = service();
        let pending = auth
            .start_phone(OtpPurpose::SignUp, "+91 98765 43210", Some("Asha Rao"))
            .await
            .unwrap();
        assert_eq!(pending.phone.as_str(), "+919876543210");
        assert_eq!(backend.otp_sent(), vec![("+919876543210".to_string(), true)]);

        assert!(matches!(
            auth.verify_otp(&pending, "12345").await,
            Err(AuthError::MalformedCode)
        ));
        let session = auth.verify_otp(&pending, OTP_CODE).await.unwrap();
        assert_eq!(session.user.full_name.as_deref(), Some("Asha Rao"));
    }

    #[tokio::test]
    async fn test_phone_sign_in_for_unknown_number_is_refused() {
        let (backend, auth) = service();
        let result = auth
            .start_phone(OtpPurpose::SignIn, "+919876543210", None)
            .await;
        assert!(matches!(result, Err(AuthError::Backend(_))));
        assert!(backend.otp_sent().is_empty());
    }

    #[tokio::test]
    async fn test_resend_keeps_purpose() {
        let (backend, auth) = service();
        let sign_up = auth
            .start_phone(OtpPurpose::SignUp, "+919876543210", Some("Asha"))
            .await
            .unwrap();
        let sign_in = PendingOtp {
            purpose: OtpPurpose::SignIn,
            ..sign_up.clone()
        };

        auth.resend_otp(&sign_up).await.unwrap();
        auth.resend_otp(&sign_in).await.unwrap();

        let create_flags: Vec<bool> = backend.otp_sent().into_iter().map(|(_, c)| c).collect();
        assert_eq!(create_flags, vec![true, true, false]);
    }

    #[tokio::test]
    async fn test_oauth_round_trip() {
        let (_, auth) = service();
        let start = auth.start_oauth(OAuthProvider::Google);
        assert!(start.url.contains("provider=google"));
        assert!(start.url.contains("redirect_to=http://localhost:3000/auth/callback"));
        assert!(start
            .url
            .contains(&PkcePair::challenge_for(&start.verifier)));

        assert!(matches!(
            auth.complete_oauth(OAUTH_CODE, None).await,
            Err(AuthError::InvalidSessionState)
        ));
        assert!(auth
            .complete_oauth(OAUTH_CODE, Some(&start.verifier))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_sign_out_notifies_listeners() {
        let (backend, auth) = service();
        let mut events = auth.subscribe();
        let user_id = UserId::new_v4();

        auth.sign_out(user_id, &secret("token")).await;
        assert_eq!(backend.signed_out(), 1);
        assert_eq!(events.recv().await.unwrap(), AuthEvent::SignedOut(user_id));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_not_validation() {
        let (backend, auth) = service();
        backend.register("asha@example.com", "secret1");
        backend.fail(Op::SignIn);
        let err = auth
            .sign_in_with_email("asha@example.com", &secret("secret1"))
            .await
            .unwrap_err();
        assert!(!err.is_validation());
    }

    #[test]
    fn test_password_length_counts_characters() {
        // Five characters, ten bytes
        assert!(matches!(
            validate_password("парол"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(validate_password("пароль").is_ok());
        assert!(validate_password("abc12").is_err());
    }

    #[test]
    fn test_pkce_pair() {
        let pair = PkcePair::generate();
        assert_eq!(pair.verifier.len(), 43);
        assert_eq!(pair.challenge, PkcePair::challenge_for(&pair.verifier));
        // RFC 7636 appendix B
        assert_eq!(
            PkcePair::challenge_for("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }
}
