//! Authentication extractors.
//!
//! The signed-in user lives in the session. Both extractors refresh the
//! access token when it is about to expire; a refresh the backend rejects
//! signs the user out locally.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use tower_sessions::Session;
use tracing::{debug, warn};

use crate::models::{CurrentUser, Flash, session_keys};
use crate::state::AppState;

/// Extractor that requires a signed-in user.
///
/// Anonymous requests are redirected to `/login` with a notification.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireAuth(user): RequireAuth) -> impl IntoResponse {
///     format!("Hello, {}!", user.display_name())
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Rejection when a signed-in user is required.
pub enum AuthRejection {
    /// Redirect to the login page.
    RedirectToLogin,
    /// No session layer in front of the handler.
    MissingSession,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to("/login").into_response(),
            Self::MissingSession => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or(AuthRejection::MissingSession)?;

        match current_user(&session, state).await {
            Some(user) => Ok(Self(user)),
            None => {
                Flash::info("Please log in to continue").push(&session).await;
                Err(AuthRejection::RedirectToLogin)
            }
        }
    }
}

/// Extractor that optionally gets the signed-in user.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = match parts.extensions.get::<Session>().cloned() {
            Some(session) => current_user(&session, state).await,
            None => None,
        };
        Ok(Self(user))
    }
}

/// Load the user from the session, refreshing an expiring token.
async fn current_user(session: &Session, state: &AppState) -> Option<CurrentUser> {
    let mut user: CurrentUser = session
        .get(session_keys::CURRENT_USER)
        .await
        .ok()
        .flatten()?;

    if !user.needs_refresh(Utc::now()) {
        return Some(user);
    }

    match state.auth().refresh(&user.refresh_token()).await {
        Ok(fresh) => {
            debug!(user_id = %user.id, "Access token refreshed");
            user.apply_refresh(&fresh);
            if let Err(e) = set_current_user(session, &user).await {
                warn!(error = %e, "Failed to store refreshed session");
            }
            Some(user)
        }
        Err(e) => {
            warn!(user_id = %user.id, error = %e, "Token refresh failed, signing out locally");
            let _ = clear_current_user(session).await;
            state.forget_user(user.id).await;
            Flash::info("Your session expired, please log in again")
                .push(session)
                .await;
            None
        }
    }
}

/// Store the signed-in user in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Remove the signed-in user from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<CurrentUser>(session_keys::CURRENT_USER)
        .await?;
    Ok(())
}
