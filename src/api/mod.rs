use crate::{
    access::AccessGate,
    auth::{ensure_schema, AuthConfig, AuthService},
    realtime::SessionChannels,
};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method, Request},
    routing::get,
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;
use url::Url;

pub(crate) mod email;
pub(crate) mod handlers;
mod openapi;

pub use email::{EmailSender, LogEmailSender, MailerConfig, OutboxMail};

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: String,
    auth_config: AuthConfig,
    mailer_config: MailerConfig,
    gate: Arc<AccessGate>,
    access_list_path: Option<PathBuf>,
) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    ensure_schema(&pool).await?;

    let auth = Arc::new(AuthService::new(pool.clone(), auth_config.clone()));
    let channels = Arc::new(SessionChannels::new());

    // Background worker drains the mail outbox (DB-backed queue); failed
    // rows are retried until their attempt budget runs out.
    email::spawn_outbox_worker(pool.clone(), Arc::new(LogEmailSender), mailer_config);

    if let Some(path) = access_list_path {
        spawn_access_list_reload(path, gate.clone());
    }

    let origin = public_origin(auth_config.public_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE])
        .allow_methods([Method::GET])
        .allow_origin(AllowOrigin::exact(origin))
        .allow_credentials(true);

    let app = Router::new()
        .route(
            "/health",
            get(handlers::health::health).options(handlers::health::health),
        )
        .route("/openapi.json", get(openapi::openapi_json))
        .route("/v1/session", get(handlers::auth::session::session))
        .route("/v1/auth/verify", get(handlers::auth::verify::verify))
        .route("/v1/live", get(handlers::ws::live))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(auth))
                .layer(Extension(gate))
                .layer(Extension(channels))
                .layer(Extension(pool)),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

/// Re-read the allow-list file on SIGHUP and swap the snapshot.
///
/// The file is the external source of truth; a broken rewrite leaves the
/// previous snapshot active.
fn spawn_access_list_reload(path: PathBuf, gate: Arc<AccessGate>) {
    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangups = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(err) => {
                error!("failed to install SIGHUP handler: {err}");
                return;
            }
        };
        while hangups.recv().await.is_some() {
            info!(path = %path.display(), "reloading access list");
            gate.replace_from_file(&path);
        }
    });
    #[cfg(not(unix))]
    {
        let _ = (path, gate);
    }
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn public_origin(public_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(public_base_url)
        .with_context(|| format!("Invalid public base URL: {public_base_url}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Public base URL must include a valid host: {public_base_url}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build public origin header")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_origin_strips_path_and_keeps_port() -> Result<()> {
        let origin = public_origin("https://sesamo.dev:8443/app/")?;
        assert_eq!(origin.to_str()?, "https://sesamo.dev:8443");

        let origin = public_origin("http://localhost:3000")?;
        assert_eq!(origin.to_str()?, "http://localhost:3000");
        Ok(())
    }

    #[test]
    fn public_origin_rejects_garbage() {
        assert!(public_origin("not a url").is_err());
    }
}
