//! # Retry Coordinator
//!
//! Resolves authorization failures for authenticated requests.
//!
//! ## Overview
//!
//! When a request comes back `401`, the coordinator refreshes the access
//! token and replays the request exactly once with the new token. However
//! many requests are rejected at the same time, only one refresh call is in
//! flight: the first caller starts it and everyone else joins it.
//!
//! ```text
//! PENDING ──2xx/other──────────────────────────────> DONE
//!    │
//!    └─401─> REFRESHING ──ok──> RETRYING ──────────> DONE | FAILED
//!                 │
//!                 └──failed──────────────────────────> FAILED(session expired)
//! ```
//!
//! ## Lifecycle of the pending refresh
//!
//! The pending refresh is set by the first caller that sees a `401` while
//! none is pending, and cleared when that refresh settles. The refresh runs
//! on its own task, so a waiter that is dropped (cancelled) never cancels the
//! refresh other waiters depend on.
//!
//! The coordinator is cheap to clone; clones share the same pending slot.
//! Tests inject a fresh coordinator (or call [`RetryCoordinator::reset`])
//! instead of relying on process-wide state.

use crate::error::{ApiError, Result};
use crate::token::TokenProvider;
use bridge_traits::http::HttpResponse;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

type SharedRefresh = Shared<BoxFuture<'static, bool>>;

struct PendingRefresh {
    generation: u64,
    outcome: SharedRefresh,
}

#[derive(Clone, Default)]
pub struct RetryCoordinator {
    pending: Arc<Mutex<Option<PendingRefresh>>>,
    generation: Arc<AtomicU64>,
}

/// Clears the pending slot when the refresh task finishes, even if the
/// provider panicked.
struct ClearOnDrop {
    pending: Arc<Mutex<Option<PendingRefresh>>>,
    generation: u64,
}

impl Drop for ClearOnDrop {
    fn drop(&mut self) {
        let mut slot = lock(&self.pending);
        if slot
            .as_ref()
            .is_some_and(|p| p.generation == self.generation)
        {
            *slot = None;
        }
    }
}

fn lock(pending: &Mutex<Option<PendingRefresh>>) -> MutexGuard<'_, Option<PendingRefresh>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RetryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a refresh is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        lock(&self.pending).is_some()
    }

    /// Forgets the pending refresh. A refresh already running keeps running
    /// and its waiters still get its outcome, but new callers start over.
    pub fn reset(&self) {
        *lock(&self.pending) = None;
    }

    /// Refreshes the access token, joining the pending refresh if there is
    /// one. All callers joined to the same refresh observe the same outcome.
    pub async fn refresh(&self, provider: Arc<dyn TokenProvider>) -> bool {
        let outcome = {
            let mut slot = lock(&self.pending);
            match slot.as_ref() {
                Some(pending) => {
                    debug!(generation = pending.generation, "Joining pending token refresh");
                    pending.outcome.clone()
                }
                None => {
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(generation, "Starting token refresh");

                    let guard = ClearOnDrop {
                        pending: Arc::clone(&self.pending),
                        generation,
                    };
                    let task = tokio::spawn(async move {
                        let _guard = guard;
                        provider.refresh_access_token().await
                    });

                    let outcome = async move {
                        task.await.unwrap_or_else(|e| {
                            warn!(error = %e, "Token refresh task failed");
                            false
                        })
                    }
                    .boxed()
                    .shared();

                    *slot = Some(PendingRefresh {
                        generation,
                        outcome: outcome.clone(),
                    });
                    outcome
                }
            }
        };

        outcome.await
    }

    /// Runs `send` with the current access token and resolves a `401`.
    ///
    /// On a `401` the token is refreshed (single-flight) and `send` is called
    /// exactly once more with the new token; that second response is final
    /// whatever its status. If the refresh fails the result is the
    /// session-expired error.
    pub async fn execute<F, Fut>(
        &self,
        provider: Arc<dyn TokenProvider>,
        mut send: F,
    ) -> Result<HttpResponse>
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<HttpResponse>>,
    {
        let token = provider.access_token().await;
        let response = send(token).await?;

        if response.status != 401 {
            return Ok(response);
        }

        debug!("Received 401, refreshing access token");
        if !self.refresh(Arc::clone(&provider)).await {
            info!("Token refresh failed, session expired");
            return Err(ApiError::session_expired());
        }

        let token = provider.access_token().await;
        debug!("Replaying request with refreshed token");
        send(token).await
    }
}

impl std::fmt::Debug for RetryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryCoordinator")
            .field("is_refreshing", &self.is_refreshing())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    struct SlowProvider {
        calls: AtomicUsize,
        outcome: bool,
        release: Notify,
    }

    impl SlowProvider {
        fn new(outcome: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                outcome,
                release: Notify::new(),
            })
        }
    }

    #[async_trait]
    impl TokenProvider for SlowProvider {
        async fn access_token(&self) -> Option<String> {
            Some("token".to_string())
        }

        async fn refresh_access_token(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            self.outcome
        }
    }

    async fn wait_until_refreshing(coordinator: &RetryCoordinator) {
        while !coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let coordinator = RetryCoordinator::new();
        let provider = SlowProvider::new(true);

        let mut waiters = Vec::new();
        for _ in 0..8 {
            let coordinator = coordinator.clone();
            let provider: Arc<dyn TokenProvider> = provider.clone();
            waiters.push(tokio::spawn(async move { coordinator.refresh(provider).await }));
        }

        wait_until_refreshing(&coordinator).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        provider.release.notify_one();

        for waiter in waiters {
            assert!(waiter.await.unwrap());
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_failed_refresh_is_shared_and_cleared() {
        let coordinator = RetryCoordinator::new();
        let provider = SlowProvider::new(false);

        let first = {
            let coordinator = coordinator.clone();
            let provider: Arc<dyn TokenProvider> = provider.clone();
            tokio::spawn(async move { coordinator.refresh(provider).await })
        };
        wait_until_refreshing(&coordinator).await;
        let second = {
            let coordinator = coordinator.clone();
            let provider: Arc<dyn TokenProvider> = provider.clone();
            tokio::spawn(async move { coordinator.refresh(provider).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        provider.release.notify_one();

        assert!(!first.await.unwrap());
        assert!(!second.await.unwrap());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_new_refresh_after_previous_settles() {
        let coordinator = RetryCoordinator::new();
        let provider = SlowProvider::new(true);
        let dyn_provider: Arc<dyn TokenProvider> = provider.clone();

        for expected_calls in 1..=2 {
            provider.release.notify_one();
            assert!(coordinator.refresh(Arc::clone(&dyn_provider)).await);
            assert_eq!(provider.calls.load(Ordering::SeqCst), expected_calls);
        }
    }

    #[tokio::test]
    async fn test_dropped_waiter_does_not_cancel_refresh() {
        let coordinator = RetryCoordinator::new();
        let provider = SlowProvider::new(true);

        let abandoned = {
            let coordinator = coordinator.clone();
            let provider: Arc<dyn TokenProvider> = provider.clone();
            tokio::spawn(async move { coordinator.refresh(provider).await })
        };
        wait_until_refreshing(&coordinator).await;
        abandoned.abort();
        let _ = abandoned.await;

        assert!(coordinator.is_refreshing());

        let joined = {
            let coordinator = coordinator.clone();
            let provider: Arc<dyn TokenProvider> = provider.clone();
            tokio::spawn(async move { coordinator.refresh(provider).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        provider.release.notify_one();

        assert!(joined.await.unwrap());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reset_clears_pending_refresh() {
        let coordinator = RetryCoordinator::new();
        let provider = SlowProvider::new(true);

        let waiter = {
            let coordinator = coordinator.clone();
            let provider: Arc<dyn TokenProvider> = provider.clone();
            tokio::spawn(async move { coordinator.refresh(provider).await })
        };
        wait_until_refreshing(&coordinator).await;

        coordinator.reset();
        assert!(!coordinator.is_refreshing());

        provider.release.notify_one();
        assert!(waiter.await.unwrap());
    }

    struct PanickingProvider;

    #[async_trait]
    impl TokenProvider for PanickingProvider {
        async fn access_token(&self) -> Option<String> {
            None
        }

        async fn refresh_access_token(&self) -> bool {
            panic!("refresh exploded");
        }
    }

    #[tokio::test]
    async fn test_panicking_refresh_reports_failure() {
        let coordinator = RetryCoordinator::new();
        assert!(!coordinator.refresh(Arc::new(PanickingProvider)).await);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_execute_passes_through_non_401() {
        let coordinator = RetryCoordinator::new();
        let provider = SlowProvider::new(true);
        let mut seen = Vec::new();

        let response = coordinator
            .execute(provider.clone(), |token| {
                seen.push(token);
                async { Ok(HttpResponse::new(500, "boom")) }
            })
            .await
            .unwrap();

        assert_eq!(response.status, 500);
        assert_eq!(seen, vec![Some("token".to_string())]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_execute_reports_session_expired() {
        let coordinator = RetryCoordinator::new();
        let provider = SlowProvider::new(false);
        provider.release.notify_one();
        let mut attempts = 0;

        let err = coordinator
            .execute(provider.clone(), |_| {
                attempts += 1;
                async { Ok(HttpResponse::new(401, "")) }
            })
            .await
            .unwrap_err();

        assert_eq!(attempts, 1);
        assert_eq!(err, ApiError::session_expired());
    }

    #[tokio::test]
    async fn test_execute_retries_exactly_once() {
        let coordinator = RetryCoordinator::new();
        let provider = SlowProvider::new(true);
        provider.release.notify_one();
        let mut attempts = 0;

        let response = coordinator
            .execute(provider.clone(), |_| {
                attempts += 1;
                async { Ok(HttpResponse::new(401, "still no")) }
            })
            .await
            .unwrap();

        // The replayed 401 is final
        assert_eq!(attempts, 2);
        assert_eq!(response.status, 401);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
