//! Domain types and the error taxonomy for the authentication flow.

use thiserror::Error;

/// Result of a successful token consumption: the session that requested the
/// login and the address it proved, with the caller-supplied casing intact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub session_id: String,
    pub contact_address: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing session id")]
    MissingSessionId,
    #[error("missing email address")]
    MissingEmail,
    #[error("malformed email address")]
    InvalidEmail,
    #[error("issuance debounced, retry in {remaining_ms}ms")]
    Debounced { remaining_ms: i64 },
    #[error("unknown token")]
    InvalidToken,
    #[error("token expired")]
    ExpiredToken,
    #[error("token already consumed")]
    AlreadyConsumed,
    #[error(transparent)]
    Persistence(#[from] anyhow::Error),
}

impl AuthError {
    /// Token-link failures are shown to the user as one generic outcome;
    /// the concrete cause stays server-side.
    #[must_use]
    pub fn is_token_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken | Self::ExpiredToken | Self::AlreadyConsumed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_hold_original_casing() {
        let credentials = Credentials {
            session_id: "s1".to_string(),
            contact_address: "User@Example.com".to_string(),
        };
        assert_eq!(credentials.contact_address, "User@Example.com");
    }

    #[test]
    fn debounced_error_reports_remaining() {
        let err = AuthError::Debounced { remaining_ms: 1500 };
        assert!(err.to_string().contains("1500ms"));
        assert!(!err.is_token_rejection());
    }

    #[test]
    fn token_rejections_are_grouped() {
        assert!(AuthError::InvalidToken.is_token_rejection());
        assert!(AuthError::ExpiredToken.is_token_rejection());
        assert!(AuthError::AlreadyConsumed.is_token_rejection());
        assert!(!AuthError::MissingEmail.is_token_rejection());
        assert!(!AuthError::Persistence(anyhow::anyhow!("db down")).is_token_rejection());
    }
}
