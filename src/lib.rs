//! Workspace umbrella crate.
//!
//! Exposes the feature flags that map to the individual workspace crates so
//! host applications can depend on `session-core-workspace` and enable
//! `desktop-shims` without wiring `core-service` and `bridge-desktop` by hand.

#[cfg(feature = "desktop-shims")]
pub use core_service::{CoreDependencies, CoreError, CoreService};
