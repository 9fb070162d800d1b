// Otter Auth Library
// Decision: Shared library for binaries (API server, OpenAPI export) and integration tests

pub mod config;
pub mod google;
pub mod openapi;
pub mod profile_picture;
pub mod routes;
pub mod storage;

use axum::{routing::get, Json, Router};
use otter_core::cors_layer;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

pub use config::{AuthConfig, DbStartupPolicy};
pub use routes::AuthState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    storage: &'static str,
}

/// Build the complete auth application around prepared state
pub fn build_app(state: AuthState) -> Router {
    let storage = if state.db.is_dev_mode() {
        "memory"
    } else {
        "postgres"
    };
    let cors = cors_layer(&state.config.cors_origins);

    let mut app = Router::new()
        .route(
            "/health",
            get(move || async move {
                Json(HealthResponse {
                    status: "ok",
                    version: env!("CARGO_PKG_VERSION"),
                    storage,
                })
            }),
        )
        .route(
            "/api-doc/openapi.json",
            get(|| async { Json(openapi::ApiDoc::openapi()) }),
        )
        .merge(routes::routes(state));

    if let Some(cors) = cors {
        app = app.layer(cors);
    }
    app.layer(TraceLayer::new_for_http())
}
