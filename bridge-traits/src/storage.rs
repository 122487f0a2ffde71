//! Durable Key/Value Storage Abstraction
//!
//! Provides the platform-agnostic trait the core persists session state through.

use async_trait::async_trait;

use crate::error::Result;

/// Secure credential storage trait
///
/// Abstracts secure storage mechanisms:
/// - macOS/iOS: Keychain
/// - Android: Keystore (hardware-backed when available)
/// - Windows: DPAPI
/// - Linux: Secret Service / libsecret
///
/// # Security Requirements
///
/// Implementations MUST:
/// - Encrypt data at rest
/// - Use platform-provided secure storage when available
/// - Never log or expose sensitive data
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SecureStore;
///
/// async fn store_token(store: &dyn SecureStore, token: &str) -> Result<()> {
///     store.set_secret("session", token.as_bytes()).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Store a secret value, replacing any previous value under `key`.
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Retrieve a secret value
    ///
    /// # Returns
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a secret. Deleting a missing key succeeds.
    async fn delete_secret(&self, key: &str) -> Result<()>;
}
