//! # Authentication Module
//!
//! Session lifecycle and credential persistence.
//!
//! ## Overview
//!
//! - [`CredentialStore`] serializes values as JSON into the host secure store
//!   and applies the configured strict or lenient failure policy
//! - [`SessionManager`] signs in, refreshes and clears the single persisted
//!   [`AuthCredentials`] record, and emits [`AuthEvent`](core_runtime::events::AuthEvent)s
//!
//! [`SessionManager`] implements [`core_api::TokenProvider`], which is how the
//! request executor obtains bearer tokens and triggers refreshes.

pub mod credential_store;
pub mod error;
pub mod session;
pub mod types;

pub use credential_store::CredentialStore;
pub use error::{AuthError, Result};
pub use session::SessionManager;
pub use types::{AuthCredentials, LoginCredentials};
