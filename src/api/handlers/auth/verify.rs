//! The token-link endpoint visited from the login mail.

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Redirect},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::access::AccessGate;
use crate::auth::AuthService;
use crate::realtime::{outcome_for, SessionChannels};

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    token: Option<String>,
}

/// Consume an emailed login token.
///
/// On success the proven identity is bound to the issuing session, every
/// live connection of that session is told the outcome, and the visitor is
/// redirected to the success page. Every token rejection redirects to the
/// same generic failure page; the distinction between unknown, expired, and
/// replayed tokens exists only in the logs.
#[utoipa::path(
    get,
    path = "/v1/auth/verify",
    params(
        ("token" = Option<String>, Query, description = "Single-use login token from the emailed link")
    ),
    responses(
        (status = 303, description = "Redirect to the success or failure page"),
        (status = 500, description = "Store failure")
    ),
    tag = "auth"
)]
pub async fn verify(
    Query(params): Query<VerifyParams>,
    auth: Extension<Arc<AuthService>>,
    gate: Extension<Arc<AccessGate>>,
    channels: Extension<Arc<SessionChannels>>,
) -> impl IntoResponse {
    let token = params.token.unwrap_or_default();

    let credentials = match auth.authenticate(&token).await {
        Ok(credentials) => credentials,
        Err(err) if err.is_token_rejection() => {
            warn!("rejected login link: {err}");
            return Redirect::to(auth.config().failure_redirect()).into_response();
        }
        Err(err) => {
            error!("token consumption hit the store: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if let Err(err) = auth
        .set_authenticated(&credentials.session_id, &credentials.contact_address)
        .await
    {
        error!("failed to bind identity to session: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let event = outcome_for(&gate, &credentials.contact_address);
    let delivered = channels.broadcast(&credentials.session_id, &event);
    debug!(
        session_id = %credentials.session_id,
        delivered,
        "authentication outcome pushed"
    );

    Redirect::to(auth.config().success_redirect()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;
    use anyhow::{Context, Result};
    use axum::http::header::LOCATION;
    use sqlx::postgres::PgPoolOptions;

    fn auth_service() -> Result<Arc<AuthService>> {
        // Lazy pool: a blank token is rejected before any query runs.
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        Ok(Arc::new(AuthService::new(
            pool,
            AuthConfig::new("https://sesamo.dev".to_string()),
        )))
    }

    #[tokio::test]
    async fn missing_token_redirects_to_the_failure_page() -> Result<()> {
        let response = verify(
            Query(VerifyParams { token: None }),
            Extension(auth_service()?),
            Extension(Arc::new(AccessGate::new())),
            Extension(Arc::new(SessionChannels::new())),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .context("missing location")?;
        assert_eq!(location, "/index.html");
        Ok(())
    }

    #[tokio::test]
    async fn blank_token_redirects_to_the_failure_page() -> Result<()> {
        let response = verify(
            Query(VerifyParams {
                token: Some("   ".to_string()),
            }),
            Extension(auth_service()?),
            Extension(Arc::new(AccessGate::new())),
            Extension(Arc::new(SessionChannels::new())),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        Ok(())
    }
}
