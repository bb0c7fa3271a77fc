//! Session cookie issuance and the inbound request gate.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::access::AccessGate;
use crate::auth::{AuthConfig, AuthService};

use super::types::SessionResponse;

pub const SESSION_COOKIE_NAME: &str = "sesamo_session";

/// Report the session's state, minting a session cookie on first contact.
///
/// `200` with the proven address and its authorization bit when the session
/// is authenticated, `204` otherwise. A request without a cookie gets a
/// fresh opaque session id via `Set-Cookie`; its lifetime is the cookie's.
#[utoipa::path(
    get,
    path = "/v1/session",
    responses(
        (status = 200, description = "Session has a proven identity", body = SessionResponse),
        (status = 204, description = "No identity proven yet")
    ),
    tag = "session"
)]
pub async fn session(
    headers: HeaderMap,
    auth: Extension<Arc<AuthService>>,
    gate: Extension<Arc<AccessGate>>,
) -> impl IntoResponse {
    let Some(session_id) = session_id_from_headers(&headers) else {
        let session_id = Uuid::new_v4().to_string();
        debug!(session_id, "minting session cookie");
        let mut response_headers = HeaderMap::new();
        match session_cookie(auth.config(), &session_id) {
            Ok(cookie) => {
                response_headers.insert(SET_COOKIE, cookie);
            }
            Err(err) => error!("failed to build session cookie: {err}"),
        }
        return (StatusCode::NO_CONTENT, response_headers).into_response();
    };

    match auth.is_authenticated(&session_id).await {
        Ok(Some(email)) => {
            let authorized = gate.is_authorized(&email);
            let response = SessionResponse { email, authorized };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("failed to lookup session state: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Read the session id presented by a request, if any.
pub(crate) fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME && !val.is_empty() {
            return Some(val.to_string());
        }
    }
    None
}

/// Build the session cookie.
///
/// No `Max-Age`: session lifetime is governed by the cookie's own lifetime,
/// not by this service.
pub(crate) fn session_cookie(
    config: &AuthConfig,
    session_id: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}={session_id}; Path=/; HttpOnly; SameSite=Lax");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;
    use anyhow::{Context, Result};
    use axum::http::HeaderValue;
    use sqlx::postgres::PgPoolOptions;

    fn auth_service() -> Result<Arc<AuthService>> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        Ok(Arc::new(AuthService::new(
            pool,
            AuthConfig::new("https://sesamo.dev".to_string()),
        )))
    }

    #[test]
    fn session_id_from_headers_finds_the_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("other=1; sesamo_session=abc; trailing=2"),
        );
        assert_eq!(session_id_from_headers(&headers), Some("abc".to_string()));
    }

    #[test]
    fn session_id_from_headers_ignores_empty_values() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("sesamo_session="));
        assert_eq!(session_id_from_headers(&headers), None);
    }

    #[test]
    fn session_id_from_headers_none_without_cookie() {
        assert_eq!(session_id_from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn session_cookie_marks_secure_for_https() -> Result<()> {
        let config = AuthConfig::new("https://sesamo.dev".to_string());
        let cookie = session_cookie(&config, "abc")?;
        let cookie = cookie.to_str().context("cookie header")?;
        assert!(cookie.starts_with("sesamo_session=abc"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Secure"));

        let config = AuthConfig::new("http://localhost:8080".to_string());
        let cookie = session_cookie(&config, "abc")?;
        assert!(!cookie.to_str().context("cookie header")?.contains("Secure"));
        Ok(())
    }

    #[tokio::test]
    async fn first_contact_mints_a_cookie() -> Result<()> {
        let gate = Arc::new(AccessGate::new());
        let response = session(HeaderMap::new(), Extension(auth_service()?), Extension(gate))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .context("missing set-cookie")?;
        assert!(cookie.starts_with("sesamo_session="));
        Ok(())
    }
}
