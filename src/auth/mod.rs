//! Login-token issuance and consumption.
//!
//! The flow has two halves. `begin_authentication` admits a request through
//! the per-address debounce guard, stores a hashed single-use token, and
//! enqueues the login mail in the same transaction. `authenticate` consumes
//! the token atomically and hands back the proven credentials; binding those
//! credentials to the session and notifying live connections is the caller's
//! job, not this module's.

pub mod config;
pub mod models;
mod repo;
pub mod service;
mod utils;

pub use config::AuthConfig;
pub use models::{AuthError, Credentials};
pub use repo::ensure_schema;
pub use service::AuthService;
