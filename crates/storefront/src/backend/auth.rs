//! `AuthGateway` over the auth interface.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use atelier_core::{Email, Phone, UserId};

use super::{
    AuthGateway, AuthSession, AuthUser, BackendClient, BackendError, OAuthProvider, SignUpOutcome,
};

/// Token lifetime assumed when the response carries none.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: WireUser,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: UserId,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    full_name: Option<String>,
}

impl From<WireUser> for AuthUser {
    fn from(user: WireUser) -> Self {
        // Unset contact fields come back as empty strings
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
        Self {
            id: user.id,
            email: non_empty(user.email),
            phone: non_empty(user.phone).map(|p| {
                if p.starts_with('+') {
                    p
                } else {
                    format!("+{p}")
                }
            }),
            full_name: non_empty(user.user_metadata.full_name),
        }
    }
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> AuthSession {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(|| {
                now + Duration::seconds(self.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS))
            });
        AuthSession {
            access_token: SecretString::from(self.access_token),
            refresh_token: SecretString::from(self.refresh_token),
            expires_at,
            user: self.user.into(),
        }
    }
}

impl BackendClient {
    async fn token_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<AuthSession, BackendError> {
        let request = self
            .request(
                Method::POST,
                &self.auth_url(&format!("token?grant_type={grant_type}")),
                None,
            )
            .json(&body);
        let token: TokenResponse = self.send_json(request).await?;
        Ok(token.into_session(Utc::now()))
    }
}

#[async_trait]
impl AuthGateway for BackendClient {
    #[instrument(skip_all, fields(email = %email))]
    async fn sign_up_with_email(
        &self,
        email: &Email,
        password: &SecretString,
        full_name: &str,
        redirect_to: &str,
    ) -> Result<SignUpOutcome, BackendError> {
        let request = self
            .request(Method::POST, &self.auth_url("signup"), None)
            .query(&[("redirect_to", redirect_to)])
            .json(&json!({
                "email": email.as_str(),
                "password": password.expose_secret(),
                "data": { "full_name": full_name },
            }));
        let body: serde_json::Value = self.send_json(request).await?;

        // With email confirmation on, only the user object comes back
        if body.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(body)?;
            Ok(SignUpOutcome::SignedIn(token.into_session(Utc::now())))
        } else {
            Ok(SignUpOutcome::ConfirmationSent)
        }
    }

    #[instrument(skip_all, fields(email = %email))]
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, BackendError> {
        self.token_grant(
            "password",
            json!({ "email": email.as_str(), "password": password.expose_secret() }),
        )
        .await
    }

    #[instrument(skip_all, fields(phone = %phone.masked(), create_user = create_user))]
    async fn send_phone_otp(
        &self,
        phone: &Phone,
        create_user: bool,
        full_name: Option<&str>,
    ) -> Result<(), BackendError> {
        let mut body = json!({
            "phone": phone.as_str(),
            "channel": "sms",
            "create_user": create_user,
        });
        if let Some(name) = full_name {
            body["data"] = json!({ "full_name": name });
        }
        let request = self
            .request(Method::POST, &self.auth_url("otp"), None)
            .json(&body);
        self.send(request).await.map(drop)
    }

    #[instrument(skip_all, fields(phone = %phone.masked()))]
    async fn verify_phone_otp(
        &self,
        phone: &Phone,
        code: &str,
    ) -> Result<AuthSession, BackendError> {
        let request = self
            .request(Method::POST, &self.auth_url("verify"), None)
            .json(&json!({ "type": "sms", "phone": phone.as_str(), "token": code }));
        let token: TokenResponse = self.send_json(request).await?;
        Ok(token.into_session(Utc::now()))
    }

    #[instrument(skip_all)]
    async fn exchange_code(
        &self,
        auth_code: &str,
        code_verifier: &str,
    ) -> Result<AuthSession, BackendError> {
        self.token_grant(
            "pkce",
            json!({ "auth_code": auth_code, "code_verifier": code_verifier }),
        )
        .await
    }

    #[instrument(skip_all)]
    async fn refresh_session(
        &self,
        refresh_token: &SecretString,
    ) -> Result<AuthSession, BackendError> {
        self.token_grant(
            "refresh_token",
            json!({ "refresh_token": refresh_token.expose_secret() }),
        )
        .await
    }

    #[instrument(skip_all)]
    async fn sign_out(&self, access_token: &SecretString) -> Result<(), BackendError> {
        let request = self.request_as(
            Method::POST,
            &self.auth_url("logout"),
            access_token.expose_secret(),
        );
        self.send(request).await.map(drop)
    }

    fn authorize_url(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
        code_challenge: &str,
    ) -> String {
        let mut url = format!(
            "{}?provider={}&redirect_to={}&code_challenge={}&code_challenge_method=s256",
            self.auth_url("authorize"),
            provider.as_str(),
            urlencoding::encode(redirect_to),
            urlencoding::encode(code_challenge),
        );
        if provider == OAuthProvider::Google {
            url.push_str("&access_type=offline&prompt=select_account");
        }
        url
    }
}
