//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the session/networking core and
//! platform-specific implementations. Each trait is a capability the core
//! needs but that is implemented differently per platform (desktop, iOS,
//! Android).
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Single-shot async HTTP exchange
//! - [`SecureStore`](storage::SecureStore) - Durable credential persistence
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Platform
//! implementations should convert their native errors into it, keeping the
//! distinction between network failures, timeouts and everything else.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across async tasks behind an `Arc`.

pub mod error;
pub mod http;
pub mod logging;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use storage::SecureStore;
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use time::{Clock, SystemClock};
