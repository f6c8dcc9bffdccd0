//! Race HTTP server: ingestion, broadcast stream and status endpoints
//!
//! The tracking device posts fixes to `/api/race/ping`; every viewer holds
//! an SSE connection to `/api/race/stream` served from its own polling task.

mod error;
mod ping;
mod state;
mod status;
mod stream;

pub use state::AppState;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;

use crate::config::Config;
use crate::storage::SharedStore;

/// Build the router with all race endpoints
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Ingestion from the tracking device
        .route("/api/race/ping", post(ping::race_ping))
        // Delayed broadcast to viewers
        .route("/api/race/stream", get(stream::race_stream))
        // Dashboard helpers
        .route("/api/race/status", get(status::race_status))
        .route("/api/race/checkpoints", get(status::race_checkpoints))
        .with_state(state)
}

/// Serve the router on an already bound listener until shutdown fires
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.await.ok();
        })
        .await
        .context("Server error")
}

/// Start the race server
pub async fn start_server(
    config: Config,
    store: SharedStore,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<()> {
    let bind_addr = config.bind_addr;
    let state = AppState::new(&config, store);

    if !state.auth_configured() {
        tracing::warn!("RACE_PING_SECRET is not set; every ping will be rejected");
    }

    let app = build_router(state);

    tracing::info!("Starting race server on {}", bind_addr);

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    tracing::info!("Race server listening on {}", bind_addr);

    serve(listener, app, shutdown_rx).await?;

    tracing::info!("Race server shut down gracefully");
    Ok(())
}
