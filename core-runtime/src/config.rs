//! # Core Configuration Module
//!
//! Provides configuration management for the session/networking core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds every setting the core reads: the API base URL, the
//! token lifetime, the environment, and storage naming. The builder fails fast
//! with an actionable message when a value is missing or malformed.
//!
//! Host bridges (HTTP client, secure store, clock) are not part of this
//! struct; they are injected separately when the service is assembled.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::{CoreConfig, Environment};
//!
//! let config = CoreConfig::builder()
//!     .base_url("https://api.example.com")
//!     .token_duration_secs(1800)
//!     .environment(Environment::Development)
//!     .build()
//!     .expect("valid config");
//!
//! assert!(config.is_development());
//! ```
//!
//! ## Environment Variables
//!
//! [`CoreConfig::from_env`] reads:
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `API_BASE_URL` | Base URL all endpoints are appended to (required) |
//! | `TOKEN_DURATION_SECONDS` | Access token lifetime in seconds |
//! | `APP_ENV` | `development` or `production` |
//! | `STORAGE_NAMESPACE` | Prefix for persisted keys |

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Default access token lifetime (1 hour).
pub const DEFAULT_TOKEN_DURATION_SECS: u64 = 3600;

/// Default namespace persisted keys are prefixed with.
pub const DEFAULT_STORAGE_NAMESPACE: &str = "session-core";

/// Storage key the session record lives under.
pub const DEFAULT_STORAGE_KEY: &str = "AUTH_CREDENTIALS";

pub const DEFAULT_LOGIN_PATH: &str = "/api/TokenAuth/AuthenticateCommunity";
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Deployment environment.
///
/// Development enables verbose request logging and, unless overridden,
/// strict storage error propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(Error::Config(format!(
                "Unknown environment '{}': expected 'development' or 'production'",
                other
            ))),
        }
    }
}

/// How storage failures are surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoragePolicy {
    /// Propagate serialization and I/O failures.
    Strict,
    /// Log the failure and behave as if nothing was stored.
    Lenient,
}

impl StoragePolicy {
    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Development => StoragePolicy::Strict,
            Environment::Production => StoragePolicy::Lenient,
        }
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, StoragePolicy::Strict)
    }
}

/// Core configuration.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Base URL endpoints are appended to, without a trailing slash
    pub base_url: String,

    /// Lifetime assigned to each access token, in seconds
    pub token_duration_secs: u64,

    pub environment: Environment,

    pub storage_policy: StoragePolicy,

    /// Prefix for every persisted key
    pub storage_namespace: String,

    /// Key of the session record within the namespace
    pub storage_key: String,

    pub login_path: String,

    pub refresh_path: String,

    /// Per-request timeout applied by the request executor
    pub request_timeout: Option<Duration>,
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Builds a configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when `API_BASE_URL` is missing or any variable
    /// holds an invalid value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = CoreConfig::builder();

        if let Some(base_url) = lookup("API_BASE_URL") {
            builder = builder.base_url(base_url);
        }

        if let Some(duration) = lookup("TOKEN_DURATION_SECONDS") {
            let secs = duration.trim().parse::<u64>().map_err(|e| {
                Error::Config(format!(
                    "TOKEN_DURATION_SECONDS must be a positive integer: {}",
                    e
                ))
            })?;
            builder = builder.token_duration_secs(secs);
        }

        if let Some(env) = lookup("APP_ENV") {
            builder = builder.environment(env.parse()?);
        }

        if let Some(namespace) = lookup("STORAGE_NAMESPACE") {
            builder = builder.storage_namespace(namespace);
        }

        builder.build()
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    /// Access token lifetime as a `chrono` duration.
    pub fn token_duration(&self) -> chrono::Duration {
        i64::try_from(self.token_duration_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("Invalid base URL '{}': {}", self.base_url, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "Base URL must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.token_duration_secs == 0 {
            return Err(Error::Config(
                "Token duration must be greater than 0 seconds".to_string(),
            ));
        }

        if i64::try_from(self.token_duration_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .is_none()
        {
            return Err(Error::Config("Token duration is too large".to_string()));
        }

        if self.storage_key.trim().is_empty() {
            return Err(Error::Config("Storage key cannot be empty".to_string()));
        }

        for (name, path) in [
            ("login_path", &self.login_path),
            ("refresh_path", &self.refresh_path),
        ] {
            if !path.starts_with('/') {
                return Err(Error::Config(format!(
                    "{} must start with '/', got '{}'",
                    name, path
                )));
            }
        }

        if self.request_timeout == Some(Duration::ZERO) {
            return Err(Error::Config(
                "Request timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    base_url: Option<String>,
    token_duration_secs: Option<u64>,
    environment: Option<Environment>,
    storage_policy: Option<StoragePolicy>,
    storage_namespace: Option<String>,
    storage_key: Option<String>,
    login_path: Option<String>,
    refresh_path: Option<String>,
    request_timeout: Option<Option<Duration>>,
}

impl CoreConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn token_duration_secs(mut self, secs: u64) -> Self {
        self.token_duration_secs = Some(secs);
        self
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Overrides the storage policy derived from the environment.
    pub fn storage_policy(mut self, policy: StoragePolicy) -> Self {
        self.storage_policy = Some(policy);
        self
    }

    pub fn storage_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.storage_namespace = Some(namespace.into());
        self
    }

    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = Some(key.into());
        self
    }

    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = Some(path.into());
        self
    }

    pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = Some(path.into());
        self
    }

    /// Sets the per-request timeout; `None` disables it.
    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Builds the final `CoreConfig`, validating every field.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the base URL is missing or any field is invalid.
    pub fn build(self) -> Result<CoreConfig> {
        let base_url = self.base_url.ok_or_else(|| {
            Error::Config(
                "Base URL is required. Set it with .base_url(...) or the API_BASE_URL \
                 environment variable."
                    .to_string(),
            )
        })?;

        let environment = self.environment.unwrap_or_default();

        let config = CoreConfig {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            token_duration_secs: self
                .token_duration_secs
                .unwrap_or(DEFAULT_TOKEN_DURATION_SECS),
            environment,
            storage_policy: self
                .storage_policy
                .unwrap_or_else(|| StoragePolicy::for_environment(environment)),
            storage_namespace: self
                .storage_namespace
                .unwrap_or_else(|| DEFAULT_STORAGE_NAMESPACE.to_string()),
            storage_key: self
                .storage_key
                .unwrap_or_else(|| DEFAULT_STORAGE_KEY.to_string()),
            login_path: self
                .login_path
                .unwrap_or_else(|| DEFAULT_LOGIN_PATH.to_string()),
            refresh_path: self
                .refresh_path
                .unwrap_or_else(|| DEFAULT_REFRESH_PATH.to_string()),
            request_timeout: self
                .request_timeout
                .unwrap_or(Some(DEFAULT_REQUEST_TIMEOUT)),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_builder_defaults() {
        let config = CoreConfig::builder()
            .base_url("https://api.example.com/")
            .build()
            .unwrap();

        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.token_duration_secs, DEFAULT_TOKEN_DURATION_SECS);
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.storage_policy, StoragePolicy::Lenient);
        assert_eq!(config.storage_namespace, "session-core");
        assert_eq!(config.storage_key, "AUTH_CREDENTIALS");
        assert_eq!(config.login_path, DEFAULT_LOGIN_PATH);
        assert_eq!(config.refresh_path, DEFAULT_REFRESH_PATH);
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
        assert!(!config.is_development());
    }

    #[test]
    fn test_development_defaults_to_strict_storage() {
        let config = CoreConfig::builder()
            .base_url("http://localhost:8080")
            .environment(Environment::Development)
            .build()
            .unwrap();

        assert!(config.is_development());
        assert_eq!(config.storage_policy, StoragePolicy::Strict);
    }

    #[test]
    fn test_explicit_storage_policy_wins() {
        let config = CoreConfig::builder()
            .base_url("http://localhost:8080")
            .environment(Environment::Development)
            .storage_policy(StoragePolicy::Lenient)
            .build()
            .unwrap();

        assert_eq!(config.storage_policy, StoragePolicy::Lenient);
    }

    #[test]
    fn test_missing_base_url_fails() {
        let result = CoreConfig::builder().build();
        match result {
            Err(Error::Config(message)) => assert!(message.contains("Base URL is required")),
            other => panic!("Expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_base_url_fails() {
        assert!(CoreConfig::builder().base_url("not a url").build().is_err());
        assert!(CoreConfig::builder()
            .base_url("ftp://example.com")
            .build()
            .is_err());
    }

    #[test]
    fn test_zero_token_duration_fails() {
        let result = CoreConfig::builder()
            .base_url("https://api.example.com")
            .token_duration_secs(0)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_paths_must_be_absolute() {
        let result = CoreConfig::builder()
            .base_url("https://api.example.com")
            .refresh_path("auth/refresh")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_token_duration_conversion() {
        let config = CoreConfig::builder()
            .base_url("https://api.example.com")
            .token_duration_secs(90)
            .build()
            .unwrap();
        assert_eq!(config.token_duration(), chrono::Duration::seconds(90));
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!(
            "Development".parse::<Environment>().unwrap(),
            Environment::Development
        );
        assert_eq!(
            "prod".parse::<Environment>().unwrap(),
            Environment::Production
        );
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_from_lookup() {
        let config = CoreConfig::from_lookup(lookup_from(&[
            ("API_BASE_URL", "https://api.example.com"),
            ("TOKEN_DURATION_SECONDS", "120"),
            ("APP_ENV", "development"),
            ("STORAGE_NAMESPACE", "test-ns"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.token_duration_secs, 120);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.storage_namespace, "test-ns");
    }

    #[test]
    fn test_from_lookup_rejects_bad_duration() {
        let result = CoreConfig::from_lookup(lookup_from(&[
            ("API_BASE_URL", "https://api.example.com"),
            ("TOKEN_DURATION_SECONDS", "soon"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_from_lookup_requires_base_url() {
        assert!(CoreConfig::from_lookup(lookup_from(&[])).is_err());
    }
}
