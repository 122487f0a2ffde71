use core_api::ApiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Secure storage unavailable: {0}")]
    Storage(String),

    #[error("Failed to (de)serialize {context}: {reason}")]
    Serialization { context: String, reason: String },

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl AuthError {
    /// Whether the server rejected the credential itself.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AuthError::Api(e) if e.is_unauthorized())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
