//! Server initialization and runtime
//!
//! Loads configuration, wires the application state, assembles the router,
//! and serves until ctrl-c.

pub mod config;
pub mod state;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use state::AppState;

/// Assemble the full application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(crate::api::router())
        .merge(crate::websocket::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Load config, wire state, and serve until shutdown
pub async fn run() -> Result<()> {
    let config = config::load_config()?;
    info!(
        "Starting Maestro v{} on {}:{}",
        env!("CARGO_PKG_VERSION"),
        config.server.host,
        config.server.port
    );

    let state = AppState::from_config(&config).await?;
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Maestro shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
