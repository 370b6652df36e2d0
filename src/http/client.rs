//! Bearer-auth HTTP client for the backend API.
//!
//! Wraps a `reqwest::Client` with an `Authorization` header interceptor
//! and a response classifier that hands expired-token failures to the
//! refresh coordinator, replaying the original request exactly once with
//! the new token.

use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use reqwest::{Client, Method, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::auth::{ACCESS_TOKEN_KEY, RefreshCoordinator};
use crate::runtime::{Page, Runtime};

use super::classify::{ApiError, ErrorPayload, Recovery, classify_response};

/// Environment variable holding the backend base URL.
pub const BASE_URL_ENV: &str = "AUTHBRIDGE_BACKEND_URL";

/// Notification key for permission-denied alerts; the runtime deduplicates
/// notifications by this key.
const PERMISSION_DENIED_KEY: &str = "permission_denied";

/// HTTP client wrapping the given reqwest Client with bearer-token
/// injection and expired-token recovery.
pub struct ApiClient {
    client: Client,
    base_url: String,
    runtime: Arc<dyn Runtime>,
    auth: RefreshCoordinator,
}

impl ApiClient {
    /// Creates a new client against the given base URL.
    pub fn new(client: Client, base_url: &str, runtime: Arc<dyn Runtime>) -> Self {
        Self {
            auth: RefreshCoordinator::new(client.clone(), base_url.to_string(), runtime.clone()),
            client,
            base_url: base_url.to_string(),
            runtime,
        }
    }

    /// Creates a client reading the base URL from the environment.
    pub fn from_env(runtime: Arc<dyn Runtime>) -> Result<Self> {
        let base_url = runtime
            .env_var(BASE_URL_ENV)
            .with_context(|| format!("{} is not set", BASE_URL_ENV))?;
        Ok(Self::new(Client::new(), &base_url, runtime))
    }

    /// Returns the refresh coordinator, e.g. to seed the in-memory access
    /// token right after sign-in.
    pub fn auth(&self) -> &RefreshCoordinator {
        &self.auth
    }

    /// Performs a GET request and deserializes the JSON response.
    #[tracing::instrument(skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.execute(Method::GET, path, None).await?;
        response
            .json::<T>()
            .await
            .context("Failed to parse JSON response")
    }

    /// Performs a POST request with a JSON body and deserializes the JSON
    /// response.
    #[tracing::instrument(skip(self, body))]
    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body).context("Failed to serialize request body")?;
        let response = self.execute(Method::POST, path, Some(body)).await?;
        response
            .json::<T>()
            .await
            .context("Failed to parse JSON response")
    }

    /// Performs a DELETE request, discarding the response body.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.execute(Method::DELETE, path, None).await?;
        Ok(())
    }

    /// Sends one request through the bearer interceptor and the response
    /// classifier, running the refresh-and-replay protocol when the access
    /// token has expired.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Response> {
        let token = self.auth.current_token();
        let response = self
            .dispatch(method.clone(), path, body.as_ref(), token.as_deref())
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let payload = ErrorPayload::parse(&response.text().await.unwrap_or_default());
        match classify_response(status, path, &payload, self.runtime.is_server()) {
            Recovery::PermissionDenied => {
                self.runtime
                    .notify_error(PERMISSION_DENIED_KEY, "Permission denied.");
                self.runtime.navigate(Page::Profile);
                Err(ApiError::PermissionDenied(payload.display_message()).into())
            }
            Recovery::RefreshToken => {
                // The persisted token is stale; drop it before the exchange
                // so nothing falls back to it mid-refresh.
                if let Err(e) = self.runtime.remove_credential(ACCESS_TOKEN_KEY) {
                    warn!("Failed to clear stale access token: {:#}", e);
                }
                let original = ApiError::ExpiredToken(payload.display_message());
                let token = self.auth.acquire_fresh_token(original).await?;
                self.replay(method, path, body.as_ref(), &token).await
            }
            Recovery::Propagate => Err(ApiError::Http {
                status: status.as_u16(),
                message: payload.display_message(),
            }
            .into()),
        }
    }

    /// Re-issues the original request once with the fresh token. The
    /// outcome is surfaced as-is: a request that fails again is never
    /// re-queued.
    async fn replay(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        token: &str,
    ) -> Result<Response> {
        let response = self.dispatch(method, path, body, Some(token)).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let payload = ErrorPayload::parse(&response.text().await.unwrap_or_default());
        Err(ApiError::Http {
            status: status.as_u16(),
            message: payload.display_message(),
        }
        .into())
    }

    /// Issues a request with the bearer interceptor applied: attaches
    /// `Authorization: Bearer <token>` when a token is available. The
    /// absence of a token is not an error at this layer.
    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        token: Option<&str>,
    ) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}...", method, url);

        let mut request = self
            .client
            .request(method, &url)
            .header(CONTENT_TYPE, "application/json");

        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .context("Invalid access token for Authorization header")?;
            value.set_sensitive(true);
            request = request.header(AUTHORIZATION, value);
        }

        if let Some(body) = body {
            request = request.json(body);
        }

        request.send().await.context("Failed to send request")
    }
}
