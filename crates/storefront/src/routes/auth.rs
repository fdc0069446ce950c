//! Authentication route handlers.
//!
//! Handles email sign-in and registration, phone one-time codes, social
//! sign-in with PKCE, and logout. Every form posts back and redirects; errors
//! are shown as notifications on the login page.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::Redirect,
};
use secrecy::SecretString;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{debug, error, instrument, warn};

use crate::backend::{AuthSession, OAuthProvider, SignUpOutcome};
use crate::error::{AppError, clear_sentry_user, set_sentry_user};
use crate::filters;
use crate::middleware::{OptionalAuth, set_current_user};
use crate::models::{CurrentUser, Flash, session_keys};
use crate::routes::Layout;
use crate::services::{AuthError, EmailSignUp, OtpPurpose, PendingOtp};
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

/// Email login form data.
#[derive(Debug, Deserialize)]
pub struct EmailLoginForm {
    pub email: String,
    pub password: String,
}

/// Email registration form data.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// Phone code request form data.
#[derive(Debug, Deserialize)]
pub struct PhoneForm {
    pub purpose: OtpPurpose,
    pub phone: String,
    pub full_name: Option<String>,
}

/// Phone code check form data.
#[derive(Debug, Deserialize)]
pub struct VerifyForm {
    pub code: String,
}

// =============================================================================
// Query Types
// =============================================================================

/// Social sign-in return parameters.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub layout: Layout,
    /// Masked number waiting for its code; shows the verify form.
    pub pending_phone: Option<String>,
    pub pending_sign_up: bool,
    pub providers: [OAuthProvider; 2],
}

// =============================================================================
// Helpers
// =============================================================================

async fn pending_otp(session: &Session) -> Option<PendingOtp> {
    session
        .get(session_keys::PENDING_OTP)
        .await
        .ok()
        .flatten()
}

/// Show an auth failure on the login page.
async fn auth_failed(session: &Session, err: &AuthError) -> Redirect {
    if err.is_validation() {
        debug!(error = %err, "Auth input rejected");
    } else {
        warn!(error = %err, "Auth request failed");
    }
    Flash::error(err.user_message()).push(session).await;
    Redirect::to("/login")
}

/// Store a fresh sign-in in a new session id and greet the shopper.
async fn complete_sign_in(session: &Session, auth: &AuthSession) -> Result<Redirect, AppError> {
    session.cycle_id().await.map_err(|e| {
        error!(error = %e, "Failed to rotate session id");
        AppError::Internal("session error".to_string())
    })?;

    let user = CurrentUser::from_auth(auth);
    set_current_user(session, &user).await.map_err(|e| {
        error!(error = %e, "Failed to store signed-in user");
        AppError::Internal("session error".to_string())
    })?;
    set_sentry_user(&user.id, user.email.as_deref());

    Flash::success(format!("Welcome, {}", user.display_name()))
        .push(session)
        .await;
    Ok(Redirect::to("/"))
}

// =============================================================================
// Login Page
// =============================================================================

/// Display the login page. Signed-in shoppers go home.
pub async fn login_page(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<LoginTemplate, Redirect> {
    if user.is_some() {
        return Err(Redirect::to("/"));
    }
    let pending = pending_otp(&session).await;
    Ok(LoginTemplate {
        layout: Layout::load(&state, &session, None).await,
        pending_phone: pending.as_ref().map(|p| p.phone.masked()),
        pending_sign_up: pending.is_some_and(|p| p.purpose == OtpPurpose::SignUp),
        providers: [OAuthProvider::Google, OAuthProvider::Facebook],
    })
}

// =============================================================================
// Email
// =============================================================================

/// Handle email sign-in.
///
/// # Errors
///
/// Returns an error if the session cannot store the sign-in.
#[instrument(skip(state, session, form))]
pub async fn login_email(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<EmailLoginForm>,
) -> Result<Redirect, AppError> {
    let password = SecretString::from(form.password);
    match state.auth().sign_in_with_email(&form.email, &password).await {
        Ok(auth) => complete_sign_in(&session, &auth).await,
        Err(e) => Ok(auth_failed(&session, &e).await),
    }
}

/// Handle email registration.
///
/// When the account needs confirming, the shopper is told to check their
/// email; otherwise they are signed in straight away.
///
/// # Errors
///
/// Returns an error if the session cannot store the sign-in.
#[instrument(skip(state, session, form))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Result<Redirect, AppError> {
    let sign_up = EmailSignUp {
        full_name: form.full_name,
        email: form.email,
        password: SecretString::from(form.password),
        confirm_password: SecretString::from(form.confirm_password),
    };
    match state.auth().sign_up_with_email(sign_up).await {
        Ok(SignUpOutcome::SignedIn(auth)) => complete_sign_in(&session, &auth).await,
        Ok(SignUpOutcome::ConfirmationSent) => {
            Flash::success("Account created! Please check your email to confirm your account")
                .push(&session)
                .await;
            Ok(Redirect::to("/login"))
        }
        Err(e) => Ok(auth_failed(&session, &e).await),
    }
}

// =============================================================================
// Phone
// =============================================================================

/// Send an SMS code and remember what it is for.
#[instrument(skip(state, session, form), fields(purpose = ?form.purpose))]
pub async fn start_phone(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<PhoneForm>,
) -> Redirect {
    match state
        .auth()
        .start_phone(form.purpose, &form.phone, form.full_name.as_deref())
        .await
    {
        Ok(pending) => {
            if let Err(e) = session.insert(session_keys::PENDING_OTP, &pending).await {
                error!(error = %e, "Failed to store pending verification");
                Flash::error("Something went wrong, please try again")
                    .push(&session)
                    .await;
                return Redirect::to("/login");
            }
            Flash::info(format!("We sent a code to {}", pending.phone.masked()))
                .push(&session)
                .await;
            Redirect::to("/login")
        }
        Err(e) => auth_failed(&session, &e).await,
    }
}

/// Check the SMS code.
///
/// # Errors
///
/// Returns an error if the session cannot store the sign-in.
#[instrument(skip(state, session, form))]
pub async fn verify(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<VerifyForm>,
) -> Result<Redirect, AppError> {
    let Some(pending) = pending_otp(&session).await else {
        return Ok(auth_failed(&session, &AuthError::InvalidSessionState).await);
    };
    match state.auth().verify_otp(&pending, &form.code).await {
        Ok(auth) => {
            if let Err(e) = session.remove::<PendingOtp>(session_keys::PENDING_OTP).await {
                warn!(error = %e, "Failed to clear pending verification");
            }
            complete_sign_in(&session, &auth).await
        }
        Err(e) => Ok(auth_failed(&session, &e).await),
    }
}

/// Send the SMS code again, for the same purpose as the first send.
#[instrument(skip(state, session))]
pub async fn resend(State(state): State<AppState>, session: Session) -> Redirect {
    let Some(pending) = pending_otp(&session).await else {
        return auth_failed(&session, &AuthError::InvalidSessionState).await;
    };
    match state.auth().resend_otp(&pending).await {
        Ok(()) => {
            Flash::info(format!("We sent a new code to {}", pending.phone.masked()))
                .push(&session)
                .await;
            Redirect::to("/login")
        }
        Err(e) => auth_failed(&session, &e).await,
    }
}

// =============================================================================
// Social
// =============================================================================

/// Send the browser to the provider, keeping the PKCE verifier.
///
/// # Errors
///
/// Returns 404 for an unknown provider.
#[instrument(skip(state, session))]
pub async fn oauth_start(
    State(state): State<AppState>,
    session: Session,
    Path(provider): Path<String>,
) -> Result<Redirect, AppError> {
    let provider: OAuthProvider = provider.parse().map_err(AppError::NotFound)?;
    let start = state.auth().start_oauth(provider);
    if let Err(e) = session
        .insert(session_keys::OAUTH_VERIFIER, &start.verifier)
        .await
    {
        error!(error = %e, "Failed to store PKCE verifier");
        return Err(AppError::Internal("session error".to_string()));
    }
    Ok(Redirect::to(&start.url))
}

/// Handle the provider's return.
///
/// # Errors
///
/// Returns an error if the session cannot store the sign-in.
#[instrument(skip(state, session, query))]
pub async fn oauth_callback(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, AppError> {
    let verifier: Option<String> = session
        .remove(session_keys::OAUTH_VERIFIER)
        .await
        .ok()
        .flatten();

    if let Some(err) = query.error {
        warn!(error = %err, "Social sign-in was not completed");
        let message = query
            .error_description
            .unwrap_or_else(|| "Sign-in was cancelled".to_string());
        Flash::error(message).push(&session).await;
        return Ok(Redirect::to("/login"));
    }
    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return Ok(auth_failed(&session, &AuthError::InvalidSessionState).await);
    };

    match state
        .auth()
        .complete_oauth(&code, verifier.as_deref())
        .await
    {
        Ok(auth) => complete_sign_in(&session, &auth).await,
        Err(e) => Ok(auth_failed(&session, &e).await),
    }
}

// =============================================================================
// Logout
// =============================================================================

/// Sign out and drop the whole session.
#[instrument(skip(state, session, user))]
pub async fn logout(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Redirect {
    if let Some(user) = user {
        state.auth().sign_out(user.id, &user.access_token()).await;
    }
    clear_sentry_user();
    if let Err(e) = session.flush().await {
        warn!(error = %e, "Failed to flush session on logout");
    }
    Flash::info("You have been logged out").push(&session).await;
    Redirect::to("/")
}
