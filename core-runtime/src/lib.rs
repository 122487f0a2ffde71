//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the session core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus for authentication state changes
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the other crates depend on. It
//! establishes the logging conventions, the configuration surface, and the
//! broadcast channel hosts use to observe sign-in, refresh and sign-out.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, Environment, StoragePolicy};
pub use error::{Error, Result};
pub use events::{AuthEvent, CoreEvent, EventBus};
pub use logging::{init_logging, LogFormat, LoggingConfig};
