// Otter auth backend
// Decision: Reached only through the gateway, which strips the /auth prefix
// Decision: Expired refresh-token ledger rows are purged by a background sweep

use std::time::Duration;

use anyhow::{Context, Result};
use otter_auth::{build_app, storage::StorageBackend, AuthConfig, AuthState, DbStartupPolicy};
use otter_core::telemetry::{init_telemetry, TelemetryConfig};

const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let telemetry_config = TelemetryConfig::from_env().for_service(
        "otter-auth",
        env!("CARGO_PKG_VERSION"),
        "otter_auth=debug,otter_core=info,tower_http=info",
    );

    // Keep the guard alive for the lifetime of the application
    let _telemetry_guard = init_telemetry(telemetry_config);

    tracing::info!("otter-auth starting...");

    let config = AuthConfig::from_env().context("Failed to load auth configuration")?;
    let db = open_storage(&config).await?;

    tracing::info!(
        refresh_rotation = config.refresh_rotation,
        google = config.google.is_some(),
        default_services = ?config.default_services,
        "Authentication configured"
    );

    if config.refresh_rotation {
        spawn_refresh_token_purge(db.clone());
    }

    let port = config.port;
    let state = AuthState::new(config, db)?;
    let app = build_app(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Pick the storage backend from DATABASE_URL and the startup policy
async fn open_storage(config: &AuthConfig) -> Result<StorageBackend> {
    let Some(url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set, using in-memory storage (dev mode)");
        return Ok(StorageBackend::in_memory());
    };

    match StorageBackend::postgres(url).await {
        Ok(db) => {
            tracing::info!("Connected to database");
            Ok(db)
        }
        Err(e) if config.db_startup == DbStartupPolicy::Degrade => {
            tracing::error!(error = %e, "Database unavailable, continuing with in-memory storage");
            Ok(StorageBackend::in_memory())
        }
        Err(e) => Err(e.context("Failed to connect to database")),
    }
}

fn spawn_refresh_token_purge(db: StorageBackend) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match db.delete_expired_refresh_tokens().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Purged expired refresh tokens"),
                Err(e) => tracing::warn!(error = %e, "Failed to purge expired refresh tokens"),
            }
        }
    });
}
