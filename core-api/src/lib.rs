//! # Core API
//!
//! Request/response contract for every outbound API call.
//!
//! ## Overview
//!
//! - [`RequestExecutor`] builds requests, attaches bearer tokens and
//!   normalizes responses
//! - [`RetryCoordinator`] turns a `401` into a single shared token refresh and
//!   one replay of the original request
//! - [`envelope`] parses the `{ result, success, error, unAuthorizedRequest }`
//!   wrapper every endpoint uses
//! - [`ApiError`] is the only error callers see: a [`StructuredApiError`] or a
//!   tagged transport failure
//! - [`AuthApi`] / [`HttpAuthApi`] reach the login and refresh endpoints
//!
//! The executor knows nothing about how tokens are stored. It reads them
//! through [`TokenProvider`], which the session manager implements.

pub mod auth_api;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod query;
pub mod retry;
pub mod token;

pub use auth_api::{AuthApi, AuthResult, HttpAuthApi, LoginRequest, RefreshResult};
pub use envelope::{ApiErrorPayload, ApiResponse};
pub use error::{ApiError, Result, StructuredApiError, TransportErrorKind};
pub use executor::{RequestExecutor, RequestOptions, ResponseBody};
pub use query::QueryParams;
pub use retry::RetryCoordinator;
pub use token::{AnonymousTokenProvider, TokenProvider};
