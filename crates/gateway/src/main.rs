// Otter API gateway
// Single public entry point: authenticates the access cookie and forwards to backends

use anyhow::{Context, Result};
use otter_core::telemetry::{init_telemetry, TelemetryConfig};
use otter_gateway::{build_app, GatewayConfig};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let telemetry_config = TelemetryConfig::from_env().for_service(
        "otter-gateway",
        env!("CARGO_PKG_VERSION"),
        "otter_gateway=debug,otter_core=info,tower_http=info",
    );

    // Keep the guard alive for the lifetime of the application
    let _telemetry_guard = init_telemetry(telemetry_config);

    tracing::info!("otter-gateway starting...");

    let config = GatewayConfig::from_env().context("Failed to load gateway configuration")?;
    let port = config.port;
    tracing::info!(
        services = ?config.registry.names().collect::<Vec<_>>(),
        upstream_timeout_secs = config.upstream_timeout.as_secs(),
        "Service registry loaded"
    );

    let app = build_app(config)?;

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("Gateway listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
