use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error(transparent)]
    Config(#[from] core_runtime::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] core_auth::AuthError),

    #[error("API error: {0}")]
    Api(#[from] core_api::ApiError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
