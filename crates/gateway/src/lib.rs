// Otter Gateway Library
// Decision: Library + thin binary so the full app can be driven in-process by tests

pub mod config;
pub mod gateway;
pub mod proxy;

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use otter_core::{cors_layer, CookieTokenResolver, TokenService};
use tower_http::trace::TraceLayer;

pub use config::GatewayConfig;
pub use gateway::GatewayState;
pub use proxy::{HttpForwarder, ReverseProxy};

/// Build the complete gateway application from configuration
pub fn build_app(config: GatewayConfig) -> Result<Router> {
    config.tokens.validate()?;
    let tokens = Arc::new(TokenService::new(config.tokens));
    let state = GatewayState::new(
        config.registry,
        Arc::new(CookieTokenResolver::new(tokens)),
        Arc::new(HttpForwarder::new(config.upstream_timeout)?),
    );

    let mut app = gateway::routes(state);
    if let Some(cors) = cors_layer(&config.cors_origins) {
        app = app.layer(cors);
    }
    Ok(app.layer(TraceLayer::new_for_http()))
}
