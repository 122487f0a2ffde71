use async_trait::async_trait;

/// Source of bearer tokens for authenticated requests.
///
/// Implemented by the session manager. The executor only reads tokens and
/// asks for a refresh; it never touches stored credentials.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current access token, or `None` when nobody is signed in.
    async fn access_token(&self) -> Option<String>;

    /// Obtains a new access token. Returns `false` on any failure; the
    /// provider decides whether the failure also ends the session.
    async fn refresh_access_token(&self) -> bool;
}

/// Provider for clients that never authenticate.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousTokenProvider;

#[async_trait]
impl TokenProvider for AnonymousTokenProvider {
    async fn access_token(&self) -> Option<String> {
        None
    }

    async fn refresh_access_token(&self) -> bool {
        false
    }
}
