//! Courtbook server binary: loads configuration, connects PostgreSQL, runs
//! migrations and serves the API until interrupted.

use courtbook_core::clock::SystemClock;
use courtbook_postgres::{PgStore, StoreConfig};
use courtbook_web::{build_router, AppState, Config};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.clone())),
        )
        .init();

    let store = PgStore::connect(&StoreConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        min_connections: config.database.min_connections,
        connect_timeout: config.database.connect_timeout,
    })
    .await?;
    store.migrate().await?;
    tracing::info!("database connected and migrated");

    let bind = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::from_store(Arc::new(store), Arc::new(SystemClock), config);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(%bind, "courtbook server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
