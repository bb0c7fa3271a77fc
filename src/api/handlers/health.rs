//! Liveness endpoint: build identity plus database reachability.

use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, PgPool};
use tracing::{error, info_span, Instrument};
use utoipa::ToSchema;

use crate::GIT_COMMIT_HASH;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    database: String,
}

impl Health {
    fn current(database_ok: bool) -> Self {
        Self {
            commit: GIT_COMMIT_HASH.to_string(),
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: if database_ok { "ok" } else { "error" }.to_string(),
        }
    }

    /// `X-App` header value: `name/version (short-commit)`.
    fn app_header(&self) -> String {
        let short_commit = self.commit.get(..7).unwrap_or(&self.commit);
        format!("{}/{} ({short_commit})", self.name, self.version)
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Database is reachable", body = Health),
        (status = 503, description = "Database is unreachable", body = Health)
    ),
    tag = "health"
)]
pub async fn health(method: Method, pool: Extension<PgPool>) -> impl IntoResponse {
    let database_ok = match ping_database(&pool).await {
        Ok(()) => true,
        Err(err) => {
            error!("database health check failed: {err}");
            false
        }
    };

    let health = Health::current(database_ok);

    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(&health.app_header()) {
        Ok(value) => {
            headers.insert("X-App", value);
        }
        Err(err) => error!("unusable X-App header: {err}"),
    }

    // Preflight checks only want the status line, not the payload.
    let body = if method == Method::GET {
        Json(health).into_response()
    } else {
        Body::empty().into_response()
    };

    let status = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, headers, body)
}

async fn ping_database(pool: &PgPool) -> Result<(), sqlx::Error> {
    let span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
    async {
        let mut conn = pool.acquire().await?;
        conn.ping().await
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use sqlx::postgres::PgPoolOptions;

    #[test]
    fn app_header_shortens_the_commit() {
        let health = Health {
            commit: "0123456789abcdef".to_string(),
            name: "sesamo".to_string(),
            version: "1.2.3".to_string(),
            database: "ok".to_string(),
        };
        assert_eq!(health.app_header(), "sesamo/1.2.3 (0123456)");
    }

    #[test]
    fn app_header_keeps_short_commits_whole() {
        let health = Health {
            commit: "abc".to_string(),
            name: "sesamo".to_string(),
            version: "1.2.3".to_string(),
            database: "ok".to_string(),
        };
        assert_eq!(health.app_header(), "sesamo/1.2.3 (abc)");
    }

    #[tokio::test]
    async fn health_reports_unreachable_database() -> Result<()> {
        // Lazy pool pointing at a closed port: acquire fails, health is 503.
        let pool = PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(250))
            .connect_lazy("postgres://postgres@127.0.0.1:1/postgres")?;

        let response = health(Method::GET, Extension(pool)).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        Ok(())
    }

    #[tokio::test]
    async fn options_health_has_an_empty_body() -> Result<()> {
        let pool = PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(250))
            .connect_lazy("postgres://postgres@127.0.0.1:1/postgres")?;

        let response = health(Method::OPTIONS, Extension(pool)).await.into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        assert!(body.is_empty());
        Ok(())
    }
}
