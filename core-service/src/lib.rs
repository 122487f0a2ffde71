//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, secure
//! storage, clock) into the session core. Desktop apps typically enable the
//! `desktop-shims` feature, which builds the bridges from `bridge-desktop`.
//!
//! ```ignore
//! let config = CoreConfig::builder().base_url("https://api.example.com").build()?;
//! let core = CoreService::desktop(config)?;
//!
//! core.restore_session().await;
//! let profile: Profile = core.api().get("/api/profile", RequestOptions::new()).await?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::{
    http::HttpClient,
    storage::SecureStore,
    time::{Clock, SystemClock},
};
use core_api::{HttpAuthApi, RequestExecutor, TokenProvider};
use core_auth::{AuthCredentials, CredentialStore, LoginCredentials, SessionManager};
use core_runtime::config::CoreConfig;
use core_runtime::events::EventBus;
use tracing::info;

/// Aggregated handle to all bridge dependencies the core requires.
pub struct CoreDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub secure_store: Arc<dyn SecureStore>,
    pub clock: Arc<dyn Clock>,
}

impl CoreDependencies {
    /// Bundle using the system clock.
    pub fn new(http_client: Arc<dyn HttpClient>, secure_store: Arc<dyn SecureStore>) -> Self {
        Self {
            http_client,
            secure_store,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<CoreConfig>,
    session: Arc<SessionManager>,
    api: Arc<RequestExecutor>,
    events: EventBus,
}

impl CoreService {
    /// Wires store, session manager, retry coordinator and executor.
    pub fn new(config: CoreConfig, deps: CoreDependencies) -> Self {
        let events = EventBus::default();
        let store = CredentialStore::from_config(&config, deps.secure_store);
        let auth_api = Arc::new(HttpAuthApi::new(&config, deps.http_client.clone()));

        let session = Arc::new(SessionManager::new(
            &config,
            store,
            auth_api,
            deps.clock,
            events.clone(),
        ));

        let provider: Arc<dyn TokenProvider> = session.clone();
        let api = RequestExecutor::new(&config, deps.http_client, provider);

        info!(
            base_url = %config.base_url,
            environment = config.environment.as_str(),
            storage_policy = ?config.storage_policy,
            "Core service initialized"
        );

        Self {
            config: Arc::new(config),
            session,
            api: Arc::new(api),
            events,
        }
    }

    /// Builds the service on the desktop bridges (reqwest + OS keychain).
    #[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
    pub fn desktop(config: CoreConfig) -> Result<Self> {
        use bridge_desktop::{KeyringSecureStore, ReqwestHttpClient};

        let http_client = match config.request_timeout {
            Some(timeout) => ReqwestHttpClient::with_timeout(timeout),
            None => ReqwestHttpClient::new(),
        }
        .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;
        let secure_store = KeyringSecureStore::with_service_name(config.storage_namespace.clone());

        Ok(Self::new(
            config,
            CoreDependencies::new(Arc::new(http_client), Arc::new(secure_store)),
        ))
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Executor for authenticated API calls.
    pub fn api(&self) -> &RequestExecutor {
        &self.api
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub async fn sign_in(
        &self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<AuthCredentials> {
        let credentials = LoginCredentials::new(username, password);
        Ok(self.session.login(&credentials).await?)
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.session.sign_out().await?;
        // Later 401s start a fresh refresh
        self.api.coordinator().reset();
        Ok(())
    }

    /// Startup check; `None` when no usable session is stored.
    pub async fn restore_session(&self) -> Option<AuthCredentials> {
        self.session.restore_session().await
    }
}
