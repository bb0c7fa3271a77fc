//! Session and token-link handlers.
//!
//! The session endpoint issues the session cookie on first contact and
//! reports the session's authentication/authorization state. The token-link
//! endpoint consumes emailed login tokens; every rejected token looks the
//! same to the visitor, only the logs know why it failed.

pub(crate) mod session;
pub(crate) mod types;
pub(crate) mod verify;

pub use session::SESSION_COOKIE_NAME;
