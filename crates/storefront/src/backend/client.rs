//! HTTP client for the row and auth interfaces.

use std::sync::Arc;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderValue};
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::config::BackendConfig;

use super::{BackendError, Conflict, Principal, RowQuery};

/// Ask for a single JSON object instead of an array.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Client for the hosted backend.
///
/// Cheap to clone; every clone shares one connection pool.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<BackendClientInner>,
}

struct BackendClientInner {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl BackendClient {
    /// Create a client for the configured backend.
    #[must_use]
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            inner: Arc::new(BackendClientInner {
                client: reqwest::Client::new(),
                base_url: config.url.as_str().trim_end_matches('/').to_string(),
                anon_key: config.anon_key.expose_secret().to_string(),
            }),
        }
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{path}", self.inner.base_url)
    }

    pub(crate) fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.inner.base_url)
    }

    /// Start a request carrying the API key and a bearer token: the user's
    /// when acting on their behalf, the anonymous key otherwise.
    pub(crate) fn request(
        &self,
        method: Method,
        url: &str,
        principal: Option<&Principal>,
    ) -> RequestBuilder {
        let bearer = principal.map_or(self.inner.anon_key.as_str(), Principal::bearer);
        self.request_as(method, url, bearer)
    }

    /// Start a request with an explicit bearer token.
    pub(crate) fn request_as(&self, method: Method, url: &str, bearer: &str) -> RequestBuilder {
        self.inner
            .client
            .request(method, url)
            .header("apikey", &self.inner.anon_key)
            .header(AUTHORIZATION, format!("Bearer {bearer}"))
    }

    /// Send a request and return the body of a successful response.
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<String, BackendError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(BackendError::RateLimited(retry_after));
        }

        let body = response.text().await?;

        if !status.is_success() {
            let err = BackendError::from_response(status.as_u16(), &body);
            if status.is_server_error() {
                tracing::error!(
                    status = %status,
                    body = %body.chars().take(500).collect::<String>(),
                    "Backend returned non-success status"
                );
            } else {
                tracing::warn!(status = %status, error = %err, "Backend rejected request");
            }
            return Err(err);
        }

        Ok(body)
    }

    /// Send a request and parse its JSON body.
    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let body = self.send(request).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse backend response"
            );
            BackendError::Parse(e)
        })
    }

    // =========================================================================
    // Row operations
    // =========================================================================

    /// Rows matching a query.
    #[instrument(skip(self, principal), fields(table = query.table_name()))]
    pub(crate) async fn select<T: DeserializeOwned>(
        &self,
        principal: Option<&Principal>,
        query: &RowQuery,
    ) -> Result<Vec<T>, BackendError> {
        let request = self
            .request(Method::GET, &self.rest_url(query.table_name()), principal)
            .query(&query.to_pairs());
        let rows: Vec<T> = self.send_json(request).await?;
        debug!(count = rows.len(), "Fetched rows");
        Ok(rows)
    }

    /// Exactly one row; zero rows is [`BackendError::NotFound`].
    #[instrument(skip(self, principal), fields(table = query.table_name()))]
    pub(crate) async fn select_single<T: DeserializeOwned>(
        &self,
        principal: Option<&Principal>,
        query: &RowQuery,
    ) -> Result<T, BackendError> {
        let request = self
            .request(Method::GET, &self.rest_url(query.table_name()), principal)
            .header(ACCEPT, HeaderValue::from_static(SINGLE_OBJECT))
            .query(&query.to_pairs());
        self.send_json(request).await
    }

    /// Insert one row and return it as stored.
    #[instrument(skip(self, principal, row))]
    pub(crate) async fn insert_returning<B, T>(
        &self,
        principal: &Principal,
        table: &'static str,
        row: &B,
    ) -> Result<T, BackendError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let request = self
            .request(Method::POST, &self.rest_url(table), Some(principal))
            .header("Prefer", "return=representation")
            .header(ACCEPT, HeaderValue::from_static(SINGLE_OBJECT))
            .json(row);
        self.send_json(request).await
    }

    /// Insert one or many rows without reading them back.
    #[instrument(skip(self, principal, rows))]
    pub(crate) async fn insert<B: Serialize + Sync + ?Sized>(
        &self,
        principal: &Principal,
        table: &'static str,
        rows: &B,
    ) -> Result<(), BackendError> {
        let request = self
            .request(Method::POST, &self.rest_url(table), Some(principal))
            .header("Prefer", "return=minimal")
            .json(rows);
        self.send(request).await.map(drop)
    }

    /// Insert or resolve a conflict on the given unique columns.
    #[instrument(skip(self, principal, row), fields(on_conflict = conflict.columns()))]
    pub(crate) async fn upsert<B: Serialize + Sync + ?Sized>(
        &self,
        principal: &Principal,
        table: &'static str,
        row: &B,
        conflict: Conflict,
    ) -> Result<(), BackendError> {
        let request = self
            .request(Method::POST, &self.rest_url(table), Some(principal))
            .query(&[("on_conflict", conflict.columns())])
            .header("Prefer", format!("{},return=minimal", conflict.resolution()))
            .json(row);
        self.send(request).await.map(drop)
    }

    /// Patch the rows matching a query.
    #[instrument(skip(self, principal, changes), fields(table = query.table_name()))]
    pub(crate) async fn update<B: Serialize + Sync + ?Sized>(
        &self,
        principal: &Principal,
        query: &RowQuery,
        changes: &B,
    ) -> Result<(), BackendError> {
        let request = self
            .request(Method::PATCH, &self.rest_url(query.table_name()), Some(principal))
            .header("Prefer", "return=minimal")
            .query(&query.to_pairs())
            .json(changes);
        self.send(request).await.map(drop)
    }

    /// Delete the rows matching a query. Matching nothing is not an error.
    #[instrument(skip(self, principal), fields(table = query.table_name()))]
    pub(crate) async fn delete(
        &self,
        principal: &Principal,
        query: &RowQuery,
    ) -> Result<(), BackendError> {
        let request = self
            .request(Method::DELETE, &self.rest_url(query.table_name()), Some(principal))
            .header("Prefer", "return=minimal")
            .query(&query.to_pairs());
        self.send(request).await.map(drop)
    }

    /// Call a remote procedure.
    #[instrument(skip(self, principal, args))]
    pub(crate) async fn rpc<B, T>(
        &self,
        principal: &Principal,
        function: &str,
        args: &B,
    ) -> Result<T, BackendError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let request = self
            .request(
                Method::POST,
                &self.rest_url(&format!("rpc/{function}")),
                Some(principal),
            )
            .json(args);
        self.send_json(request).await
    }
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("base_url", &self.inner.base_url)
            .field("anon_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}
