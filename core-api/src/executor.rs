//! # Request Executor
//!
//! Performs API calls against the configured base URL and normalizes every
//! outcome into a value or an [`ApiError`].
//!
//! ## Request pipeline
//!
//! 1. URL = base URL + endpoint + query string (see [`crate::query`])
//! 2. Headers = JSON defaults merged with caller headers (last write wins,
//!    case-insensitive)
//! 3. Bearer token from the [`TokenProvider`] when `is_auth` is set; a missing
//!    token is not an error
//! 4. JSON body, if any
//! 5. Send, racing the caller's cancellation token
//! 6. `401` on an authenticated request goes through the [`RetryCoordinator`]
//! 7. Non-2xx: [`envelope::error_from_failure`]
//! 8. 2xx: JSON bodies are unwrapped from the envelope (`success: false` is an
//!    error), anything else is returned as text
//!
//! ## Usage
//!
//! ```ignore
//! use core_api::{QueryParams, RequestOptions};
//!
//! let items: Vec<Item> = executor
//!     .get("/api/items", RequestOptions::new().params(QueryParams::new().with("page", 1)))
//!     .await?;
//! ```

use crate::envelope;
use crate::error::{ApiError, Result, TransportErrorKind};
use crate::query::{build_url, QueryParams};
use crate::retry::RetryCoordinator;
use crate::token::TokenProvider;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bytes::Bytes;
use core_runtime::config::CoreConfig;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

const JSON_MEDIA_TYPE: &str = "application/json";

/// Per-call options.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub body: Option<Value>,
    pub params: Option<QueryParams>,
    /// Attach the bearer token and resolve `401` by refreshing. Defaults to
    /// `true`.
    pub is_auth: bool,
    pub headers: Vec<(String, String)>,
    pub cancel: Option<CancellationToken>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            body: None,
            params: None,
            is_auth: true,
            headers: Vec::new(),
            cancel: None,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serializes `body` as the JSON request body.
    pub fn json<T: Serialize + ?Sized>(self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body).map_err(|e| {
            ApiError::transport(
                TransportErrorKind::Encode,
                format!("Failed to serialize request body: {}", e),
            )
        })?;
        Ok(self.body(value))
    }

    pub fn params(mut self, params: QueryParams) -> Self {
        self.params = Some(params);
        self
    }

    /// Skips the bearer token and the refresh-on-401 path.
    pub fn anonymous(mut self) -> Self {
        self.is_auth = false;
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Successful response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// `result` of a JSON envelope
    Json(Value),
    /// Raw body of a non-JSON (or empty) response
    Text(String),
}

impl ResponseBody {
    /// Decodes the payload. Text decodes as a JSON string and an empty body
    /// as `null`, so `()` and `Option<T>` work for bodiless endpoints.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        let value = match self {
            ResponseBody::Json(value) => value,
            ResponseBody::Text(text) if text.is_empty() => Value::Null,
            ResponseBody::Text(text) => Value::String(text),
        };
        serde_json::from_value(value)
            .map_err(|e| ApiError::decode(format!("Failed to decode response: {}", e)))
    }
}

pub struct RequestExecutor {
    http_client: Arc<dyn HttpClient>,
    token_provider: Arc<dyn TokenProvider>,
    coordinator: RetryCoordinator,
    base_url: String,
    timeout: Option<Duration>,
    verbose: bool,
}

impl RequestExecutor {
    pub fn new(
        config: &CoreConfig,
        http_client: Arc<dyn HttpClient>,
        token_provider: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            http_client,
            token_provider,
            coordinator: RetryCoordinator::new(),
            base_url: config.base_url.clone(),
            timeout: config.request_timeout,
            verbose: config.is_development(),
        }
    }

    /// Replaces the retry coordinator, e.g. to share one between executors.
    pub fn with_coordinator(mut self, coordinator: RetryCoordinator) -> Self {
        self.coordinator = coordinator;
        self
    }

    pub fn coordinator(&self) -> &RetryCoordinator {
        &self.coordinator
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str, options: RequestOptions) -> Result<T> {
        let options = RequestOptions {
            body: None,
            ..options
        };
        self.request(HttpMethod::Get, endpoint, options).await
    }

    pub async fn post<T: DeserializeOwned>(&self, endpoint: &str, options: RequestOptions) -> Result<T> {
        self.request(HttpMethod::Post, endpoint, options).await
    }

    pub async fn put<T: DeserializeOwned>(&self, endpoint: &str, options: RequestOptions) -> Result<T> {
        self.request(HttpMethod::Put, endpoint, options).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str, options: RequestOptions) -> Result<T> {
        self.request(HttpMethod::Delete, endpoint, options).await
    }

    /// Performs a request and decodes the result into `T`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T> {
        self.request_raw(method, endpoint, options).await?.decode()
    }

    /// Performs a request and returns the undecoded payload.
    pub async fn request_raw(
        &self,
        method: HttpMethod,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ResponseBody> {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "api_request",
            request_id = %request_id,
            method = %method,
            endpoint = endpoint,
            is_auth = options.is_auth
        );

        let cancel = options.cancel.clone();
        let call = self.perform(method, endpoint, options).instrument(span.clone());

        match cancel {
            Some(cancel) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        span.in_scope(|| debug!("Request cancelled"));
                        Err(ApiError::cancelled())
                    }
                    result = call => result,
                }
            }
            None => call.await,
        }
    }

    async fn perform(
        &self,
        method: HttpMethod,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ResponseBody> {
        let url = build_url(&self.base_url, endpoint, options.params.as_ref());
        let template = self.build_request(method, &url, &options)?;

        if self.verbose {
            debug!(
                url = %url,
                body = %options.body.as_ref().map_or_else(|| "No Body".to_string(), |v| v.to_string()),
                "--> request"
            );
        }

        let send = |token: Option<String>| {
            let mut request = template.clone();
            if let Some(token) = token {
                set_header(&mut request, "Authorization", format!("Bearer {}", token));
            }
            let client = Arc::clone(&self.http_client);
            async move { client.execute(request).await.map_err(ApiError::from) }
        };

        let result = if options.is_auth {
            self.coordinator
                .execute(Arc::clone(&self.token_provider), send)
                .await
        } else {
            send(None).await
        };

        let response = result.map_err(|e| {
            if self.verbose && e.transport_kind().is_some() {
                warn!(url = %url, error = %e, "<-- FATAL");
            }
            e
        })?;

        self.handle_response(&url, response)
    }

    fn build_request(
        &self,
        method: HttpMethod,
        url: &str,
        options: &RequestOptions,
    ) -> Result<HttpRequest> {
        let mut request = HttpRequest::new(method, url);
        set_header(&mut request, "Content-Type", JSON_MEDIA_TYPE);
        set_header(&mut request, "Accept", JSON_MEDIA_TYPE);
        for (key, value) in &options.headers {
            set_header(&mut request, key, value.clone());
        }

        if let Some(body) = options.body.as_ref().filter(|b| !b.is_null()) {
            let bytes = serde_json::to_vec(body).map_err(|e| {
                ApiError::transport(
                    TransportErrorKind::Encode,
                    format!("Failed to serialize request body: {}", e),
                )
            })?;
            request = request.body(Bytes::from(bytes));
        }

        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        Ok(request)
    }

    fn handle_response(&self, url: &str, response: HttpResponse) -> Result<ResponseBody> {
        let text = response.text_lossy();

        if self.verbose {
            debug!(url = %url, status = response.status, response = %text, "<-- response");
        }

        if !response.is_success() {
            let error = envelope::error_from_failure(response.status, &text);
            debug!(
                status = error.status,
                code = error.code,
                unauthorized = error.unauthorized_request,
                "Request failed"
            );
            return Err(ApiError::Api(error));
        }

        let is_json = response
            .content_type()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains(JSON_MEDIA_TYPE));

        if is_json && !text.is_empty() {
            let result = envelope::unwrap_result::<Value>(response.status, &text, false)?;
            return Ok(ResponseBody::Json(result));
        }

        Ok(ResponseBody::Text(text))
    }
}

/// Inserts a header, replacing any existing header with the same name
/// regardless of case.
fn set_header(request: &mut HttpRequest, key: &str, value: impl Into<String>) {
    request
        .headers
        .retain(|existing, _| !existing.eq_ignore_ascii_case(key));
    request.headers.insert(key.to_string(), value.into());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::AnonymousTokenProvider;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use core_runtime::config::Environment;
    use mockall::mock;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    mock! {
        Tokens {}

        #[async_trait]
        impl TokenProvider for Tokens {
            async fn access_token(&self) -> Option<String>;
            async fn refresh_access_token(&self) -> bool;
        }
    }

    /// Replays queued responses and records every request it sees.
    #[derive(Default)]
    struct ScriptedClient {
        responses: Mutex<VecDeque<BridgeResult<HttpResponse>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedClient {
        fn with(responses: Vec<BridgeResult<HttpResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedClient {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(BridgeError::OperationFailed("no response queued".into())))
        }
    }

    /// Hands out "old" until refreshed, then "new".
    #[derive(Default)]
    struct RotatingTokens {
        refreshes: AtomicUsize,
    }

    #[async_trait]
    impl TokenProvider for RotatingTokens {
        async fn access_token(&self) -> Option<String> {
            let token = if self.refreshes.load(Ordering::SeqCst) == 0 {
                "old"
            } else {
                "new"
            };
            Some(token.to_string())
        }

        async fn refresh_access_token(&self) -> bool {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    /// Never answers; used to observe cancellation.
    struct HangingClient;

    #[async_trait]
    impl HttpClient for HangingClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            futures::future::pending().await
        }
    }

    fn config() -> CoreConfig {
        CoreConfig::builder()
            .base_url("https://api.example.com/")
            .environment(Environment::Development)
            .build()
            .unwrap()
    }

    fn json_ok(body: Value) -> BridgeResult<HttpResponse> {
        Ok(HttpResponse::new(200, body.to_string()).with_header("content-type", "application/json; charset=utf-8"))
    }

    fn executor(client: Arc<dyn HttpClient>, tokens: MockTokens) -> RequestExecutor {
        RequestExecutor::new(&config(), client, Arc::new(tokens))
    }

    fn authorization(request: &HttpRequest) -> Option<&str> {
        request
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("authorization"))
            .map(|(_, v)| v.as_str())
    }

    #[tokio::test]
    async fn test_get_builds_url_headers_and_bearer() {
        let client = ScriptedClient::with(vec![json_ok(json!({"result": [1, 2], "success": true}))]);
        let mut tokens = MockTokens::new();
        tokens
            .expect_access_token()
            .returning(|| Some("abc".to_string()));
        tokens.expect_refresh_access_token().never();

        let items: Vec<u32> = executor(client.clone(), tokens)
            .get(
                "/api/items",
                RequestOptions::new()
                    .params(QueryParams::new().with("a", 1).with("b", Value::Null).with("c", "x y"))
                    .body(json!({"ignored": true})),
            )
            .await
            .unwrap();

        assert_eq!(items, vec![1, 2]);
        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.url, "https://api.example.com/api/items?a=1&c=x%20y");
        assert_eq!(authorization(request), Some("Bearer abc"));
        assert_eq!(request.headers.get("Content-Type").map(String::as_str), Some("application/json"));
        assert_eq!(request.headers.get("Accept").map(String::as_str), Some("application/json"));
        assert!(request.body.is_none());
        assert_eq!(request.timeout, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_post_serializes_body_and_merges_headers() {
        let client = ScriptedClient::with(vec![json_ok(json!({"result": null, "success": true}))]);
        let mut tokens = MockTokens::new();
        tokens.expect_access_token().returning(|| None);

        let options = RequestOptions::new()
            .json(&json!({"name": "Ana"}))
            .unwrap()
            .header("accept", "text/plain")
            .header("X-Trace", "1");
        let _: () = executor(client.clone(), tokens)
            .post("/api/people", options)
            .await
            .unwrap();

        let request = &client.requests()[0];
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.body.as_deref(), Some(br#"{"name":"Ana"}"#.as_slice()));
        // Caller header replaced the default under a differently-cased key
        assert_eq!(request.headers.get("accept").map(String::as_str), Some("text/plain"));
        assert!(!request.headers.contains_key("Accept"));
        assert_eq!(request.headers.get("X-Trace").map(String::as_str), Some("1"));
        // No token: request proceeds without the header
        assert_eq!(authorization(request), None);
    }

    #[tokio::test]
    async fn test_anonymous_request_never_refreshes() {
        let client = ScriptedClient::with(vec![Ok(HttpResponse::new(401, ""))]);
        let mut tokens = MockTokens::new();
        tokens.expect_access_token().never();
        tokens.expect_refresh_access_token().never();

        let err = executor(client.clone(), tokens)
            .get::<Value>("/api/public", RequestOptions::new().anonymous())
            .await
            .unwrap_err();

        assert_eq!(client.requests().len(), 1);
        assert_eq!(authorization(&client.requests()[0]), None);
        let structured = err.as_structured().unwrap();
        assert_eq!(structured.status, 401);
        assert!(structured.unauthorized_request);
    }

    #[tokio::test]
    async fn test_401_refreshes_and_replays_with_new_token() {
        let client = ScriptedClient::with(vec![
            Ok(HttpResponse::new(401, "")),
            json_ok(json!({"result": "ok", "success": true})),
        ]);
        let tokens = Arc::new(RotatingTokens::default());
        let executor = RequestExecutor::new(&config(), client.clone(), tokens.clone());

        let value: String = executor
            .put("/api/profile", RequestOptions::new().body(json!({"a": 1})))
            .await
            .unwrap();

        assert_eq!(value, "ok");
        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(authorization(&requests[0]), Some("Bearer old"));
        assert_eq!(authorization(&requests[1]), Some("Bearer new"));
        assert_eq!(requests[1].body, requests[0].body);
        assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_is_session_expired() {
        let client = ScriptedClient::with(vec![Ok(HttpResponse::new(401, ""))]);
        let mut tokens = MockTokens::new();
        tokens.expect_access_token().returning(|| Some("old".to_string()));
        tokens.expect_refresh_access_token().times(1).returning(|| false);

        let err = executor(client.clone(), tokens)
            .delete::<Value>("/api/items/1", RequestOptions::new())
            .await
            .unwrap_err();

        assert_eq!(client.requests().len(), 1);
        assert_eq!(err, ApiError::session_expired());
    }

    #[tokio::test]
    async fn test_html_500_is_generic_error() {
        let html = "<html><h1>500 Internal Server Error</h1></html>";
        let client = ScriptedClient::with(vec![Ok(
            HttpResponse::new(500, html).with_header("Content-Type", "text/html")
        )]);
        let executor = RequestExecutor::new(&config(), client, Arc::new(AnonymousTokenProvider));

        let err = executor
            .get::<Value>("/api/items", RequestOptions::new())
            .await
            .unwrap_err();

        let structured = err.as_structured().unwrap();
        assert_eq!(structured.message, "HTTP Error: 500");
        assert_eq!(structured.details.as_deref(), Some(html));
        assert_eq!(structured.status, 500);
    }

    #[tokio::test]
    async fn test_success_false_rejects() {
        let client = ScriptedClient::with(vec![json_ok(json!({
            "result": null,
            "success": false,
            "error": {"code": 42, "message": "Not allowed", "details": "quota"},
            "unAuthorizedRequest": false
        }))]);
        let executor = RequestExecutor::new(&config(), client, Arc::new(AnonymousTokenProvider));

        let err = executor
            .get::<Value>("/api/items", RequestOptions::new())
            .await
            .unwrap_err();

        let structured = err.as_structured().unwrap();
        assert_eq!(structured.code, 42);
        assert_eq!(structured.message, "Not allowed");
        assert_eq!(structured.details.as_deref(), Some("quota"));
    }

    #[tokio::test]
    async fn test_plain_text_and_empty_bodies() {
        let client = ScriptedClient::with(vec![
            Ok(HttpResponse::new(200, "pong").with_header("Content-Type", "text/plain")),
            Ok(HttpResponse::new(204, "").with_header("Content-Type", "application/json")),
        ]);
        let executor = RequestExecutor::new(&config(), client, Arc::new(AnonymousTokenProvider));

        let raw = executor
            .request_raw(HttpMethod::Get, "/ping", RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(raw, ResponseBody::Text("pong".to_string()));

        let nothing: Option<Value> = executor
            .post("/api/empty", RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(nothing, None);
    }

    #[tokio::test]
    async fn test_transport_failure_is_tagged() {
        let client = ScriptedClient::with(vec![Err(BridgeError::Timeout("30s".to_string()))]);
        let executor = RequestExecutor::new(&config(), client, Arc::new(AnonymousTokenProvider));

        let err = executor
            .get::<Value>("/api/items", RequestOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::Timeout));
        assert_eq!(err.to_structured().status, 0);
    }

    #[tokio::test]
    async fn test_undecodable_result_is_decode_error() {
        let client = ScriptedClient::with(vec![json_ok(json!({"result": "text", "success": true}))]);
        let executor = RequestExecutor::new(&config(), client, Arc::new(AnonymousTokenProvider));

        let err = executor
            .get::<u32>("/api/count", RequestOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::Decode));
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let client = ScriptedClient::with(vec![]);
        let executor = RequestExecutor::new(&config(), client.clone(), Arc::new(AnonymousTokenProvider));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = executor
            .get::<Value>("/api/items", RequestOptions::new().cancel_token(cancel))
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_in_flight_request() {
        let executor = RequestExecutor::new(&config(), Arc::new(HangingClient), Arc::new(AnonymousTokenProvider));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = executor
            .get::<Value>("/api/slow", RequestOptions::new().cancel_token(cancel))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
