//! Time Source Abstraction
//!
//! Session expiry is computed from an injected [`Clock`] so tests can pin
//! "now" instead of racing the wall clock.

use chrono::{DateTime, Utc};

/// Source of the current UTC time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time via [`Utc::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
