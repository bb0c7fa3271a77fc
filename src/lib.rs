//! # Sesamo (Passwordless Email-Link Authentication)
//!
//! `sesamo` authenticates users without passwords: a browser session asks for
//! a login link, the service emails a single-use token, and visiting the link
//! proves control of the address. The proven identity is bound to the session
//! and pushed in real time to every live connection sharing it.
//!
//! ## Two-Stage Security Model
//!
//! Authentication and authorization are deliberately separate:
//!
//! - **Authenticated:** the session proved control of an email address by
//!   consuming a login token.
//! - **Authorized:** that address is present on the service allow-list.
//!
//! A session can be authenticated but unauthorized; connections are told so
//! explicitly instead of being silently locked out.
//!
//! ## Token Lifecycle
//!
//! Login tokens are 32 random bytes, delivered out-of-band and stored only as
//! a SHA-256 hash. Each token is consumed at most once; consumption is a
//! single conditional `UPDATE`, so concurrent attempts race safely and
//! exactly one wins. Unconsumed tokens expire after a configurable window,
//! checked lazily at consumption time.
//!
//! ## Allow-List
//!
//! The allow-list is an in-memory snapshot swapped atomically on update.
//! Readers never lock and never observe a partially-updated set. A malformed
//! update is logged and ignored; it can never clear authorization for
//! everyone.

pub mod access;
pub mod api;
pub mod auth;
pub mod cli;
pub mod realtime;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
