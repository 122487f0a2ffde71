//! Response envelope parsing.
//!
//! Every endpoint wraps its payload as
//! `{ result, success, error: {code, message, details} | null, unAuthorizedRequest }`.
//! The functions here turn a raw status/body pair into either the `result`
//! value or a [`StructuredApiError`].

use crate::error::{ApiError, Result, StructuredApiError};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// Message used when an envelope reports failure without an error object.
pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected API error occurred.";

/// Error object carried by a failed envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorPayload {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}

/// Wire envelope. Every field is optional so partial bodies still parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T = Value> {
    #[serde(default)]
    pub result: Option<T>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub error: Option<ApiErrorPayload>,
    #[serde(default, rename = "unAuthorizedRequest")]
    pub unauthorized_request: bool,
}

impl ApiResponse<Value> {
    /// Parses a body as an envelope. Returns `None` for anything that is not
    /// a JSON object.
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }
}

/// Builds the error for a non-2xx response.
///
/// The error object of a parseable envelope wins; the HTTP status fills in
/// whatever it omits. Without one, the generic `HTTP Error: <status>` error
/// keeps the raw body in `details`. `unauthorized_request` is set for any 401
/// and whenever the envelope says so.
pub fn error_from_failure(status: u16, body: &str) -> StructuredApiError {
    let fallback = StructuredApiError::from_status(status, body);

    match ApiResponse::parse(body) {
        Some(ApiResponse {
            error: Some(payload),
            unauthorized_request,
            ..
        }) => StructuredApiError {
            status,
            message: payload.message.unwrap_or(fallback.message),
            code: payload.code.unwrap_or(fallback.code),
            details: payload.details,
            unauthorized_request: status == 401 || unauthorized_request,
        },
        _ => fallback,
    }
}

/// Builds the error for an envelope that arrived with a 2xx status but
/// reported `success: false`.
pub fn error_from_envelope<T>(status: u16, envelope: &ApiResponse<T>) -> StructuredApiError {
    let payload = envelope.error.clone().unwrap_or_default();
    StructuredApiError {
        status,
        message: payload
            .message
            .unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string()),
        code: payload.code.unwrap_or(i64::from(status)),
        details: payload.details,
        unauthorized_request: envelope.unauthorized_request,
    }
}

/// Unwraps the `result` of a successful envelope body.
///
/// With `require_success` the envelope must say `success: true`; otherwise
/// only an explicit `success: false` fails. A missing `result` decodes as
/// JSON `null`.
pub fn unwrap_result<T: DeserializeOwned>(
    status: u16,
    body: &str,
    require_success: bool,
) -> Result<T> {
    let envelope: ApiResponse<Value> = serde_json::from_str(body)
        .map_err(|e| ApiError::decode(format!("Invalid response envelope: {}", e)))?;

    let failed = match envelope.success {
        Some(success) => !success,
        None => require_success,
    };
    if failed {
        return Err(ApiError::Api(error_from_envelope(status, &envelope)));
    }

    let result = envelope.result.unwrap_or(Value::Null);
    serde_json::from_value(result)
        .map_err(|e| ApiError::decode(format!("Unexpected result shape: {}", e)))
}
