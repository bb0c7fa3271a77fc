//! Generated API document served at `/openapi.json`.
//!
//! The WebSocket endpoint is intentionally undocumented here; `OpenAPI` has
//! no vocabulary for it.

use axum::response::Json;
use utoipa::OpenApi;

use super::handlers::{auth, health};

#[derive(OpenApi)]
#[openapi(
    paths(health::health, auth::session::session, auth::verify::verify),
    components(schemas(health::Health, auth::types::SessionResponse)),
    tags(
        (name = "session", description = "Session cookie issuance and state"),
        (name = "auth", description = "Login-link consumption"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
