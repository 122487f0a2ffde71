//! Credential Storage
//!
//! JSON key/value persistence on top of the host [`SecureStore`].
//!
//! ## Failure policy
//!
//! Every read, write and delete can fail (keychain locked, corrupt entry,
//! serialization error). What happens next depends on the [`StoragePolicy`]
//! given at construction:
//!
//! - [`StoragePolicy::Strict`]: the failure is logged and returned.
//! - [`StoragePolicy::Lenient`]: the failure is logged and swallowed. Reads
//!   return `None`, writes and deletes become no-ops, so a broken store looks
//!   like "no session" and the user is asked to sign in again.
//!
//! A stored value that cannot be deserialized is deleted in both modes.
//!
//! ## Example
//!
//! ```no_run
//! use core_auth::CredentialStore;
//! use core_runtime::config::StoragePolicy;
//! use std::sync::Arc;
//! # use bridge_traits::storage::SecureStore;
//! # async fn example(secure_store: Arc<dyn SecureStore>) -> core_auth::Result<()> {
//! let store = CredentialStore::new(secure_store, "session-core", StoragePolicy::Lenient);
//!
//! store.set("greeting", &"hello").await?;
//! let value: Option<String> = store.get("greeting").await?;
//! store.remove("greeting").await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use bridge_traits::storage::SecureStore;
use core_runtime::config::{CoreConfig, StoragePolicy};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct CredentialStore {
    secure_store: Arc<dyn SecureStore>,
    namespace: String,
    policy: StoragePolicy,
}

impl CredentialStore {
    /// Keys are stored as `<namespace>.<key>` so separate namespaces never
    /// collide in a shared secure store.
    pub fn new(
        secure_store: Arc<dyn SecureStore>,
        namespace: impl Into<String>,
        policy: StoragePolicy,
    ) -> Self {
        Self {
            secure_store,
            namespace: namespace.into(),
            policy,
        }
    }

    pub fn from_config(config: &CoreConfig, secure_store: Arc<dyn SecureStore>) -> Self {
        Self::new(
            secure_store,
            config.storage_namespace.clone(),
            config.storage_policy,
        )
    }

    pub fn policy(&self) -> StoragePolicy {
        self.policy
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Reads and deserializes the value stored under `key`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let full_key = self.storage_key(key);

        let data = match self.secure_store.get_secret(&full_key).await {
            Ok(data) => data,
            Err(e) => {
                return self.degrade(
                    key,
                    "get",
                    AuthError::Storage(e.to_string()),
                    None,
                )
            }
        };

        let Some(data) = data else {
            debug!(key, "No value stored");
            return Ok(None);
        };

        match serde_json::from_slice(&data) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key, error = %e, "Stored value is corrupted, deleting it");
                if let Err(delete_err) = self.secure_store.delete_secret(&full_key).await {
                    warn!(key, error = %delete_err, "Failed to delete corrupted value");
                }
                self.degrade(
                    key,
                    "get",
                    AuthError::Serialization {
                        context: format!("stored value '{}'", key),
                        reason: e.to_string(),
                    },
                    None,
                )
            }
        }
    }

    /// Serializes `value` as JSON and stores it under `key`, replacing any
    /// previous value.
    pub async fn set<T: Serialize + ?Sized + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let json = match serde_json::to_vec(value) {
            Ok(json) => json,
            Err(e) => {
                return self.degrade(
                    key,
                    "set",
                    AuthError::Serialization {
                        context: format!("value for '{}'", key),
                        reason: e.to_string(),
                    },
                    (),
                )
            }
        };

        match self
            .secure_store
            .set_secret(&self.storage_key(key), &json)
            .await
        {
            Ok(()) => {
                debug!(key, "Value stored");
                Ok(())
            }
            Err(e) => self.degrade(key, "set", AuthError::Storage(e.to_string()), ()),
        }
    }

    /// Deletes the value under `key`. Deleting a missing key succeeds.
    pub async fn remove(&self, key: &str) -> Result<()> {
        match self.secure_store.delete_secret(&self.storage_key(key)).await {
            Ok(()) => {
                debug!(key, "Value removed");
                Ok(())
            }
            Err(e) => self.degrade(key, "remove", AuthError::Storage(e.to_string()), ()),
        }
    }

    fn degrade<T>(&self, key: &str, operation: &str, error: AuthError, fallback: T) -> Result<T> {
        warn!(
            key,
            operation,
            policy = ?self.policy,
            error = %error,
            "Credential storage operation failed"
        );
        if self.policy.is_strict() {
            Err(error)
        } else {
            Ok(fallback)
        }
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}.{}", self.namespace, key)
    }
}
