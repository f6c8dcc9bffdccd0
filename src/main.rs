// racetrack - GPS ingestion and delayed live broadcast for a race
//
// A tracking device posts GPS fixes over HTTP; viewers follow the runner
// over a server-sent event stream that replays positions with a
// configurable delay.
//
// Architecture:
// - Server (axum): ping endpoint, per-viewer SSE broadcast, status endpoints
// - Storage: append-only SQLite position store shared by all handlers
// - Client: reconciler that merges stream events and derives race progress,
//   fed either by the live stream (watch) or a synthesized run (replay)

mod cli;
mod client;
mod config;
mod logging;
mod race;
mod server;
mod startup;
mod storage;

use anyhow::{Context, Result};
use cli::Commands;
use client::{replay::ReplayFeed, SessionState, TrackingMode, TrackingSession};
use config::Config;
use std::sync::Arc;
use std::time::Duration;
use storage::SqliteStore;

/// How long open viewer streams may hold up shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::parse();

    // Config commands run without logging or a store
    if let Some(Commands::Config { show, reset, path }) = cli.command {
        cli::handle_config(show, reset, path);
        return Ok(());
    }

    // Ensure config template exists (helps users discover options)
    Config::ensure_config_exists();

    let config = Config::from_env().context("Failed to load configuration")?;

    // The guard must be kept alive for the duration of the program to ensure logs flush
    let _file_guard = logging::init_tracing(&config.logging);

    match cli.command {
        None | Some(Commands::Serve) => run_server(config).await,
        Some(Commands::Watch { url }) => run_watch(config, url).await,
        Some(Commands::Replay {
            interval_ms,
            follow,
        }) => run_replay(config, interval_ms, follow).await,
        Some(Commands::Config { .. }) => Ok(()),
    }
}

async fn run_server(config: Config) -> Result<()> {
    startup::print_startup(&config);

    let store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("Failed to open position store {}", config.db_path.display()))?;
    tracing::info!("Position store ready (SQLite: {})", config.db_path.display());

    // Create shutdown channel for graceful server shutdown
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let mut server_handle = tokio::spawn(server::start_server(
        config,
        Arc::new(store),
        shutdown_rx,
    ));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
        }
        // Server exited on its own (bind failure etc.)
        result = &mut server_handle => {
            return result.context("Server task failed")?;
        }
    }

    tracing::info!("Shutting down...");

    // If the send fails, the server has already shut down (which is fine)
    let _ = shutdown_tx.send(());

    // Viewer streams never end on their own; don't wait on them forever
    match tokio::time::timeout(SHUTDOWN_GRACE, server_handle).await {
        Ok(Ok(result)) => result?,
        Ok(Err(e)) => tracing::error!("Server task failed: {}", e),
        Err(_) => tracing::warn!("Open viewer streams did not close in time"),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Oneshot that fires on Ctrl+C
fn ctrl_c_channel() -> tokio::sync::oneshot::Receiver<()> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(());
        }
    });
    rx
}

async fn run_watch(config: Config, url: Option<String>) -> Result<()> {
    let url = url.unwrap_or_else(|| config.tracker.stream_url.clone());
    let mut session = TrackingSession::new(TrackingMode::Live, &config.tracker, config.race.clone());

    tracing::info!("Watching {} ({})", url, config.race.name);
    client::sse::watch(
        &url,
        &mut session,
        config.tracker.reconnect_delay(),
        ctrl_c_channel(),
    )
    .await
}

async fn run_replay(config: Config, interval_ms: Option<u64>, follow: bool) -> Result<()> {
    let interval = interval_ms
        .map(|ms| Duration::from_millis(ms.max(1)))
        .unwrap_or_else(|| config.tracker.replay_interval());

    let feed = ReplayFeed::from_route(
        &config.race.route,
        config.race.start,
        config.tracker.replay_speed_mps,
    )?;
    let mut session =
        TrackingSession::new(TrackingMode::Replay, &config.tracker, config.race.clone());

    let mut shutdown_rx = ctrl_c_channel();
    client::replay::run_replay(feed, &mut session, interval, &mut shutdown_rx).await?;

    // Interrupted replays come back closed
    if !follow || session.state() == SessionState::Closed {
        session.close();
        return Ok(());
    }

    session.switch_mode(TrackingMode::Live);
    tracing::info!(
        "Replay done, following {} ({})",
        config.tracker.stream_url,
        session.mode().as_str()
    );
    client::sse::watch(
        &config.tracker.stream_url,
        &mut session,
        config.tracker.reconnect_delay(),
        shutdown_rx,
    )
    .await
}
