//! The authentication core: token issuance and single-use consumption.

use sqlx::PgPool;
use tracing::{debug, info};

use super::config::AuthConfig;
use super::models::{AuthError, Credentials};
use super::repo::{self, Admission, ConsumeOutcome};
use super::utils::{generate_login_token, hash_login_token, normalize_email, valid_email};

/// Facade over the token store, the debounce guard, and the session store.
pub struct AuthService {
    pool: PgPool,
    config: AuthConfig,
}

impl AuthService {
    #[must_use]
    pub fn new(pool: PgPool, config: AuthConfig) -> Self {
        Self { pool, config }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Issue a single-use login token for `(session_id, email)`.
    ///
    /// Validation happens before any state is touched. The debounce guard is
    /// asked first; only an admitted request stores a token and enqueues the
    /// login mail. The returned credentials carry the caller's casing; all
    /// internal keys use the lowercased address.
    ///
    /// # Errors
    ///
    /// `MissingSessionId` / `MissingEmail` / `InvalidEmail` on bad input,
    /// `Debounced` when the address asked too recently, `Persistence` when
    /// the store fails.
    pub async fn begin_authentication(
        &self,
        session_id: &str,
        email: &str,
    ) -> Result<Credentials, AuthError> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(AuthError::MissingSessionId);
        }
        let email = email.trim();
        if email.is_empty() {
            return Err(AuthError::MissingEmail);
        }
        let normalized = normalize_email(email);
        if !valid_email(&normalized) {
            return Err(AuthError::InvalidEmail);
        }

        match repo::admit_issuance(
            &self.pool,
            &normalized,
            self.config.debounce_window_seconds(),
        )
        .await?
        {
            Admission::Admitted => {}
            Admission::Debounced { remaining_ms } => {
                debug!(email = %normalized, remaining_ms, "issuance debounced");
                return Err(AuthError::Debounced { remaining_ms });
            }
        }

        let token = generate_login_token()?;
        let token_hash = hash_login_token(&token);
        repo::record_issuance(
            &self.pool,
            &token_hash,
            &token,
            session_id,
            email,
            &self.config,
        )
        .await?;

        info!(email = %normalized, session_id, "login token issued");

        Ok(Credentials {
            session_id: session_id.to_string(),
            contact_address: email.to_string(),
        })
    }

    /// Consume a login token, returning the credentials it proves.
    ///
    /// Exactly one of any number of concurrent calls for the same token
    /// succeeds. Binding the identity to the session is the caller's
    /// responsibility, not a side effect of this call.
    ///
    /// # Errors
    ///
    /// `InvalidToken` for unknown tokens, `ExpiredToken` past the window,
    /// `AlreadyConsumed` after the first success, `Persistence` when the
    /// store fails.
    pub async fn authenticate(&self, token: &str) -> Result<Credentials, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::InvalidToken);
        }

        let token_hash = hash_login_token(token);
        match repo::consume_login_token(&self.pool, &token_hash).await? {
            ConsumeOutcome::Consumed {
                session_id,
                contact_address,
            } => Ok(Credentials {
                session_id,
                contact_address,
            }),
            ConsumeOutcome::NotFound => Err(AuthError::InvalidToken),
            ConsumeOutcome::Expired => Err(AuthError::ExpiredToken),
            ConsumeOutcome::AlreadyConsumed => Err(AuthError::AlreadyConsumed),
        }
    }

    /// Persist the proven identity for a session.
    ///
    /// # Errors
    ///
    /// `Persistence` when the store fails.
    pub async fn set_authenticated(
        &self,
        session_id: &str,
        contact_address: &str,
    ) -> Result<(), AuthError> {
        repo::set_authenticated(&self.pool, session_id, contact_address).await?;
        Ok(())
    }

    /// The address a session has proven, if any.
    ///
    /// # Errors
    ///
    /// `Persistence` when the store fails.
    pub async fn is_authenticated(&self, session_id: &str) -> Result<Option<String>, AuthError> {
        let address = repo::is_authenticated(&self.pool, session_id).await?;
        Ok(address)
    }
}
