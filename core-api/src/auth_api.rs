//! Login and token refresh endpoints.
//!
//! These calls bypass the [`RequestExecutor`](crate::executor::RequestExecutor):
//! they never carry a bearer token and never trigger a refresh themselves.

use crate::envelope;
use crate::error::{ApiError, Result, TransportErrorKind};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use core_runtime::config::CoreConfig;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Body of the login call.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub user_name_or_email_address: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_name_or_email_address: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("user_name_or_email_address", &self.user_name_or_email_address)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Result of a successful login.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResult {
    pub access_token: String,
    pub refresh_token: String,
    /// Numeric on the wire; kept as a string
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
}

impl fmt::Debug for AuthResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthResult")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

/// Result of a successful token refresh.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResult {
    pub access_token: String,
}

impl fmt::Debug for RefreshResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshResult").finish_non_exhaustive()
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResult>;

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResult>;
}

/// [`AuthApi`] over the host HTTP client.
pub struct HttpAuthApi {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    login_path: String,
    refresh_path: String,
    timeout: Option<Duration>,
}

impl HttpAuthApi {
    pub fn new(config: &CoreConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            base_url: config.base_url.clone(),
            login_path: config.login_path.clone(),
            refresh_path: config.refresh_path.clone(),
            timeout: config.request_timeout,
        }
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = HttpRequest::new(HttpMethod::Post, &url)
            .header("Accept", "application/json")
            .json(body)
            .map_err(|e| ApiError::transport(TransportErrorKind::Encode, e.to_string()))?;
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = self.http_client.execute(request).await.map_err(|e| {
            warn!(url = %url, error = %e, "Auth request failed before a response");
            ApiError::from(e)
        })?;

        let text = response.text_lossy();
        if !response.is_success() {
            let error = envelope::error_from_failure(response.status, &text);
            debug!(status = error.status, code = error.code, "Auth request rejected");
            return Err(ApiError::Api(error));
        }

        envelope::unwrap_result(response.status, &text, true)
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    #[instrument(skip_all)]
    async fn login(&self, request: &LoginRequest) -> Result<AuthResult> {
        self.post_json(&self.login_path, request).await
    }

    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResult> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct RefreshRequest<'a> {
            refresh_token: &'a str,
        }

        self.post_json(&self.refresh_path, &RefreshRequest { refresh_token })
            .await
    }
}
