//! # Session Manager
//!
//! Owns the lifecycle of the persisted [`AuthCredentials`] record.
//!
//! ## Overview
//!
//! The credential store is the source of truth: every operation reads the
//! record fresh and nothing is cached between calls. The manager is the only
//! component that writes or deletes the record.
//!
//! ```text
//! login ──> AuthApi::login ──> write record ──> SignedIn
//! refresh_token ──> read record ──> AuthApi::refresh
//!     ├─ ok ───────────────> rewrite record (same user / refresh token) ──> TokenRefreshed
//!     ├─ credential rejected ──> clear record ──> SessionExpired
//!     └─ other failure ──────> keep record ──> AuthError { recoverable: true }
//! ```
//!
//! Refresh failures are split on purpose: a rejected credential forces a new
//! sign-in, while a transient failure keeps the session so a later refresh
//! can succeed.
//!
//! Every sign-in and clear bumps a session epoch. A refresh only applies its
//! outcome if the epoch is unchanged once the network call returns, so a
//! refresh that was in flight during sign-out never writes the record back.
//!
//! ## Usage
//!
//! ```ignore
//! let manager = SessionManager::new(&config, store, auth_api, clock, event_bus);
//!
//! manager.login(&LoginCredentials::new("jane@example.com", "secret")).await?;
//! let token = manager.get_access_token().await?;
//! ```

use crate::credential_store::CredentialStore;
use crate::error::Result;
use crate::types::{AuthCredentials, LoginCredentials};
use async_trait::async_trait;
use bridge_traits::time::Clock;
use core_api::{AuthApi, AuthResult, TokenProvider};
use core_runtime::config::CoreConfig;
use core_runtime::events::{AuthEvent, EventBus};
use core_runtime::logging::redact_if_sensitive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

pub struct SessionManager {
    store: CredentialStore,
    auth_api: Arc<dyn AuthApi>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    storage_key: String,
    token_duration: chrono::Duration,
    epoch: AtomicU64,
}

impl SessionManager {
    pub fn new(
        config: &CoreConfig,
        store: CredentialStore,
        auth_api: Arc<dyn AuthApi>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            auth_api,
            clock,
            event_bus,
            storage_key: config.storage_key.clone(),
            token_duration: config.token_duration(),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.event_bus
    }

    /// Reads the current session from storage.
    pub async fn get_session(&self) -> Result<Option<AuthCredentials>> {
        self.store.get(&self.storage_key).await
    }

    /// Current access token, if signed in.
    pub async fn get_access_token(&self) -> Result<Option<String>> {
        Ok(self.get_session().await?.map(|s| s.access_token))
    }

    pub async fn is_authenticated(&self) -> bool {
        matches!(self.get_session().await, Ok(Some(_)))
    }

    /// Signs in and replaces any previous session.
    ///
    /// On failure the stored record is left untouched.
    #[instrument(skip_all, fields(user = %redact_if_sensitive("user", &credentials.username)))]
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<AuthCredentials> {
        let result = self
            .auth_api
            .login(&credentials.to_request())
            .await
            .map_err(|e| {
                warn!(error = %e, "Login failed");
                e
            })?;

        let session = self.set_session(&result).await?;
        info!(user_id = %session.user_id, "Signed in");
        self.event_bus.emit_auth(AuthEvent::SignedIn {
            user_id: session.user_id.clone(),
        });
        Ok(session)
    }

    /// Writes a fresh session for a login result, expiring `token_duration`
    /// from now.
    pub async fn set_session(&self, result: &AuthResult) -> Result<AuthCredentials> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.write_session(
            result.user_id.clone(),
            result.access_token.clone(),
            result.refresh_token.clone(),
        )
        .await
    }

    /// Obtains a new access token using the stored refresh token.
    ///
    /// Returns `Ok(false)` without a network call when there is no session,
    /// and on any refresh failure. Only storage errors under a strict policy
    /// are returned as `Err`.
    ///
    /// If the session was cleared or replaced while the refresh call was in
    /// flight, the outcome is discarded and `Ok(false)` is returned.
    #[instrument(skip_all)]
    pub async fn refresh_token(&self) -> Result<bool> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let Some(current) = self.get_session().await? else {
            debug!("No session to refresh");
            return Ok(false);
        };

        self.event_bus.emit_auth(AuthEvent::TokenRefreshing);

        let outcome = self.auth_api.refresh(&current.refresh_token).await;

        if self.epoch.load(Ordering::SeqCst) != epoch {
            info!("Session changed during refresh, discarding result");
            return Ok(false);
        }

        match outcome {
            Ok(refreshed) => {
                let session = self
                    .write_session(
                        current.user_id,
                        refreshed.access_token,
                        current.refresh_token,
                    )
                    .await?;

                let expires_at = session.expires_at().map_or(0, |dt| dt.timestamp());
                info!(expires_at, "Access token refreshed");
                self.event_bus
                    .emit_auth(AuthEvent::TokenRefreshed { expires_at });
                Ok(true)
            }
            Err(e) if e.is_unauthorized() => {
                warn!(error = %e, "Refresh token rejected, clearing session");
                self.clear_session().await?;
                self.event_bus.emit_auth(AuthEvent::SessionExpired {
                    reason: e.to_structured().message,
                });
                Ok(false)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, keeping session");
                self.event_bus.emit_auth(AuthEvent::AuthError {
                    message: e.to_structured().message,
                    recoverable: true,
                });
                Ok(false)
            }
        }
    }

    /// Deletes the stored session unconditionally.
    ///
    /// Any refresh still in flight will not restore it.
    pub async fn clear_session(&self) -> Result<()> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.store.remove(&self.storage_key).await
    }

    /// Clears the session and announces it.
    pub async fn sign_out(&self) -> Result<()> {
        let user_id = match self.get_session().await {
            Ok(session) => session.map(|s| s.user_id),
            Err(e) => {
                debug!(error = %e, "Could not read session before sign-out");
                None
            }
        };

        self.clear_session().await?;
        info!("Signed out");
        self.event_bus.emit_auth(AuthEvent::SignedOut { user_id });
        Ok(())
    }

    /// Startup check for a persisted session.
    ///
    /// Any failure is logged and treated as "no session".
    pub async fn restore_session(&self) -> Option<AuthCredentials> {
        match self.get_session().await {
            Ok(Some(session)) => {
                let expired = session.is_expired(self.clock.now());
                info!(user_id = %session.user_id, expired, "Restored persisted session");
                self.event_bus.emit_auth(AuthEvent::SessionRestored {
                    user_id: session.user_id.clone(),
                    expired,
                });
                Some(session)
            }
            Ok(None) => {
                debug!("No persisted session");
                None
            }
            Err(e) => {
                error!(error = %e, "Failed to check session on startup");
                None
            }
        }
    }

    async fn write_session(
        &self,
        user_id: String,
        access_token: String,
        refresh_token: String,
    ) -> Result<AuthCredentials> {
        let session = AuthCredentials::issue(
            user_id,
            access_token,
            refresh_token,
            self.clock.now(),
            self.token_duration,
        );
        self.store.set(&self.storage_key, &session).await?;
        Ok(session)
    }
}

#[async_trait]
impl TokenProvider for SessionManager {
    async fn access_token(&self) -> Option<String> {
        self.get_access_token().await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not read access token");
            None
        })
    }

    async fn refresh_access_token(&self) -> bool {
        self.refresh_token().await.unwrap_or_else(|e| {
            warn!(error = %e, "Token refresh aborted by storage failure");
            false
        })
    }
}
