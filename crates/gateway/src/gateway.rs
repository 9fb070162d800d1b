// Gateway request pipeline
// Decision: Every non-health request goes through one fallback handler; routing is by first segment
// Decision: Public paths skip resolution entirely, so an expired cookie never blocks /auth/refresh

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    response::Response,
    routing::get,
    Json, Router,
};
use otter_core::{authorize, ApiError, ServiceRegistry, SessionResolver};
use serde::Serialize;

use crate::proxy::ReverseProxy;

/// State shared by every gateway request
#[derive(Clone)]
pub struct GatewayState {
    pub registry: Arc<ServiceRegistry>,
    pub resolver: Arc<dyn SessionResolver>,
    pub proxy: Arc<dyn ReverseProxy>,
}

impl GatewayState {
    pub fn new(
        registry: ServiceRegistry,
        resolver: Arc<dyn SessionResolver>,
        proxy: Arc<dyn ReverseProxy>,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            resolver,
            proxy,
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Create gateway routes
pub fn routes(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(health))
        .fallback(proxy_request)
        .with_state(state)
}

/// ALL /{service}/*: resolve, authorize, forward
async fn proxy_request(
    State(state): State<GatewayState>,
    request: Request<Body>,
) -> Result<Response, ApiError> {
    let path = request.uri().path().to_string();
    let (service, rest) = ServiceRegistry::split_path(&path).ok_or(ApiError::UnknownService)?;
    let upstream = state.registry.get(service).ok_or_else(|| {
        tracing::debug!(service = %service, "Unknown service");
        ApiError::UnknownService
    })?;

    if upstream.is_public(rest) {
        return state.proxy.forward(request, upstream, None).await;
    }

    let principal = state.resolver.resolve(request.headers()).await;
    let principal = authorize(principal.as_ref(), service).map_err(|denied| {
        tracing::warn!(
            service = %service,
            path = %path,
            sub = principal.as_ref().map(|p| p.sub.as_str()).unwrap_or("-"),
            reason = ?denied,
            "Access denied"
        );
        ApiError::from(denied)
    })?;

    state.proxy.forward(request, upstream, Some(principal)).await
}
