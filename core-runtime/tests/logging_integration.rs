//! Integration tests for the global logging setup

use bridge_traits::logging::{ConsoleLogger, LogLevel};
use core_runtime::config::Environment;
use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LoggingConfig};
use core_runtime::Error;
use std::sync::Arc;

#[test]
fn test_init_logging_only_once() {
    let config = LoggingConfig::for_environment(Environment::Development)
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Trace)
        .with_logger_sink(Arc::new(ConsoleLogger::default()));

    init_logging(config.clone()).expect("first initialization succeeds");
    tracing::info!(user = %redact_if_sensitive("user", "jane@example.com"), "logging ready");

    // A global subscriber is already installed for this process
    assert!(matches!(init_logging(config), Err(Error::Config(_))));
}

#[test]
fn test_redaction_of_credential_fields() {
    for field in ["accessToken", "refresh_token", "password", "Authorization"] {
        assert_eq!(redact_if_sensitive(field, "value"), "[REDACTED]");
    }
    assert_eq!(redact_if_sensitive("status", "401"), "401");
}
