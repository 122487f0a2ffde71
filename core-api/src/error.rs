//! API error taxonomy.
//!
//! Every failure leaving the request executor is an [`ApiError`]: either an
//! [`ApiError::Api`] carrying the normalized [`StructuredApiError`] produced
//! from an HTTP or envelope failure, or an [`ApiError::Transport`] for
//! failures that never produced a usable response (unreachable host,
//! timeout, cancellation, undecodable payload).

use bridge_traits::error::BridgeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please log in again.";
pub const SESSION_EXPIRED_DETAILS: &str = "Token refresh failed or was not possible.";

/// Normalized error produced from any failed HTTP exchange.
///
/// `message` is meant to be shown to the user as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message} (status {status})")]
pub struct StructuredApiError {
    /// HTTP status, or `0` for a transport-level failure
    pub status: u16,
    pub message: String,
    /// Server-defined code, often equal to the HTTP status
    pub code: i64,
    pub details: Option<String>,
    /// The credential itself was rejected
    #[serde(rename = "unAuthorizedRequest")]
    pub unauthorized_request: bool,
}

impl StructuredApiError {
    /// Fallback error for a response whose body could not be read as an
    /// envelope.
    pub fn from_status(status: u16, raw_body: impl Into<String>) -> Self {
        Self {
            status,
            message: format!("HTTP Error: {}", status),
            code: i64::from(status),
            details: Some(raw_body.into()),
            unauthorized_request: status == 401,
        }
    }

    /// Error returned when a 401 could not be resolved by refreshing the
    /// access token. Callers should route the user back to sign-in.
    pub fn session_expired() -> Self {
        Self {
            status: 401,
            message: SESSION_EXPIRED_MESSAGE.to_string(),
            code: 401,
            details: Some(SESSION_EXPIRED_DETAILS.to_string()),
            unauthorized_request: true,
        }
    }
}

/// Failure classes that never produced an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportErrorKind {
    /// Host unreachable, connection reset, TLS failure
    Network,
    Timeout,
    /// The caller's cancellation token fired
    Cancelled,
    /// A response body could not be decoded into the expected shape
    Decode,
    /// The request body could not be serialized
    Encode,
}

impl TransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportErrorKind::Network => "network",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Cancelled => "cancelled",
            TransportErrorKind::Decode => "decode",
            TransportErrorKind::Encode => "encode",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("API error: {0}")]
    Api(StructuredApiError),

    #[error("Transport error ({kind}): {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },
}

impl ApiError {
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        ApiError::Transport {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::transport(TransportErrorKind::Cancelled, "Request was cancelled")
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::transport(TransportErrorKind::Decode, message)
    }

    pub fn session_expired() -> Self {
        ApiError::Api(StructuredApiError::session_expired())
    }

    /// HTTP status of the failure, `0` for transport failures.
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Api(e) => e.status,
            ApiError::Transport { .. } => 0,
        }
    }

    /// Whether the server signalled that the credential is invalid.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Api(e) if e.unauthorized_request)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            ApiError::Transport {
                kind: TransportErrorKind::Cancelled,
                ..
            }
        )
    }

    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            ApiError::Transport { kind, .. } => Some(*kind),
            ApiError::Api(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&StructuredApiError> {
        match self {
            ApiError::Api(e) => Some(e),
            ApiError::Transport { .. } => None,
        }
    }

    /// Collapses any failure into the structured shape presented to users.
    ///
    /// Transport failures become `status = 0`, `code = 0`, with the transport
    /// message in `details`.
    pub fn to_structured(&self) -> StructuredApiError {
        match self {
            ApiError::Api(e) => e.clone(),
            ApiError::Transport { kind, message } => StructuredApiError {
                status: 0,
                message: match kind {
                    TransportErrorKind::Timeout => "The request timed out.".to_string(),
                    TransportErrorKind::Cancelled => "The request was cancelled.".to_string(),
                    _ => "A network error occurred.".to_string(),
                },
                code: 0,
                details: Some(message.clone()),
                unauthorized_request: false,
            },
        }
    }
}

impl From<StructuredApiError> for ApiError {
    fn from(error: StructuredApiError) -> Self {
        ApiError::Api(error)
    }
}

impl From<BridgeError> for ApiError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Timeout(msg) => ApiError::transport(TransportErrorKind::Timeout, msg),
            BridgeError::Network(msg) => ApiError::transport(TransportErrorKind::Network, msg),
            other => ApiError::transport(TransportErrorKind::Network, other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
