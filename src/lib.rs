//! Infrascope -- threshold-based anomaly evaluation for infrastructure telemetry.
//!
//! This crate provides the metric catalog, the rolling-history anomaly
//! evaluator, historical pattern analysis, and the HTTP service that exposes them.

pub mod analysis;
pub mod api;
pub mod config;
pub mod detect;
pub mod storage;
pub mod telemetry;

use anyhow::{Context, Result};

use crate::config::AppConfig;

/// Start the Infrascope service: storage, live evaluator, and API server.
pub async fn serve(config: AppConfig) -> Result<()> {
    // 1. Initialize Storage
    let db_path = config.server.db_path.clone();
    tracing::info!(db_path = %db_path.display(), "Initializing database");
    let pool = storage::open_pool(&db_path)?;

    // 2. Build shared state (catalog + live evaluator)
    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;
    let state = api::state::AppState::new(pool, config)?;
    tracing::info!(rules = state.catalog.rules().count(), "Metric catalog ready");

    // 3. Start API Server
    let app = api::router(state);

    tracing::info!(%addr, "Infrascope listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
