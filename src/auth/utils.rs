//! Small helpers for address normalization and login-token handling.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use sha2::{Digest, Sha256};

/// Normalize an email for debounce and allow-list keys.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Create a new single-use login token.
///
/// The raw value only travels inside the emailed link; the database stores a hash.
pub(crate) fn generate_login_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate login token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a login token so raw values never touch the database.
pub(crate) fn hash_login_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Build the login link included in outbound mail.
pub(crate) fn build_login_url(public_base_url: &str, token: &str) -> String {
    let base = public_base_url.trim_end_matches('/');
    format!("{base}/v1/auth/verify?token={token}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn generate_login_token_round_trip() {
        let decoded_len = generate_login_token()
            .ok()
            .and_then(|token| URL_SAFE_NO_PAD.decode(token.as_bytes()).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(32));
    }

    #[test]
    fn generated_tokens_are_unique() {
        let first = generate_login_token().ok();
        let second = generate_login_token().ok();
        assert!(first.is_some());
        assert_ne!(first, second);
    }

    #[test]
    fn hash_login_token_stable() {
        let first = hash_login_token("token");
        let second = hash_login_token("token");
        let different = hash_login_token("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
    }

    #[test]
    fn build_login_url_trims_trailing_slash() {
        let url = build_login_url("https://sesamo.dev/", "token");
        assert_eq!(url, "https://sesamo.dev/v1/auth/verify?token=token");
    }
}
