//! Host Log Forwarding
//!
//! The core logs through `tracing`. Hosts that want those records in their
//! own pipeline (OSLog, Logcat, a desktop log file) implement [`LoggerSink`];
//! the runtime's subscriber layer converts each event into a [`LogEntry`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One forwarded log record.
///
/// Field values are already redacted by the time they reach a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    /// Module path of the emitting code, e.g. `core_api::retry`
    pub target: String,
    pub message: String,
    pub fields: BTreeMap<String, String>,
    /// Innermost span, e.g. `api_request`
    pub span: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            timestamp: Utc::now(),
            target: target.into(),
            message: message.into(),
            fields: BTreeMap::new(),
            span: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_span(mut self, span: impl Into<String>) -> Self {
        self.span = Some(span.into());
        self
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:>5} {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.level.as_str().to_uppercase(),
            self.target
        )?;
        if let Some(span) = &self.span {
            write!(f, " [{}]", span)?;
        }
        write!(f, ": {}", self.message)?;
        for (key, value) in &self.fields {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}

/// Receives log records forwarded from the core.
#[async_trait]
pub trait LoggerSink: Send + Sync {
    async fn log(&self, entry: LogEntry) -> Result<()>;

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Records below this level are dropped before reaching the sink.
    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

/// Writes records to stderr, one line each.
#[derive(Debug, Clone)]
pub struct ConsoleLogger {
    min_level: LogLevel,
}

impl ConsoleLogger {
    pub fn new(min_level: LogLevel) -> Self {
        Self { min_level }
    }
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

#[async_trait]
impl LoggerSink for ConsoleLogger {
    async fn log(&self, entry: LogEntry) -> Result<()> {
        if entry.level >= self.min_level {
            eprintln!("{}", entry);
        }
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_entry_display_is_single_line() {
        let mut entry = LogEntry::new(LogLevel::Warn, "core_api::retry", "Token refresh failed")
            .with_field("status", "401")
            .with_field("attempt", "1")
            .with_span("api_request");
        entry.timestamp = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        assert_eq!(
            entry.to_string(),
            "03:04:05.000  WARN core_api::retry [api_request]: Token refresh failed attempt=1 status=401"
        );
    }

    #[test]
    fn test_level_ordering_and_serde() {
        assert!(LogLevel::Error > LogLevel::Warn);
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert_eq!(serde_json::to_string(&LogLevel::Warn).unwrap(), "\"warn\"");
    }

    #[tokio::test]
    async fn test_console_logger_accepts_entries() {
        let logger = ConsoleLogger::new(LogLevel::Debug);
        assert_eq!(logger.min_level(), LogLevel::Debug);
        logger
            .log(LogEntry::new(LogLevel::Info, "test", "hello"))
            .await
            .unwrap();
        logger.flush().await.unwrap();
    }
}
