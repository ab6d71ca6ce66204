//! Jukebox Player - Main entry point
//!
//! Restores every session's playback clock from the database, runs the
//! playback controller and session collector, and serves live updates over SSE.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jukebox_common::EventBus;
use jukebox_player::api;
use jukebox_player::config::TomlConfig;
use jukebox_player::db::{self, Stores};
use jukebox_player::gc::SessionCollector;
use jukebox_player::remote::{RemoteSync, WebApiPlayer};
use jukebox_player::PlaybackController;

/// Command-line arguments for jukebox-player
#[derive(Parser, Debug)]
#[command(name = "jukebox-player")]
#[command(about = "Playback controller for collaborative jukebox sessions")]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long, env = "JUKEBOX_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long, env = "JUKEBOX_PORT")]
    port: Option<u16>,

    /// Path to SQLite database (overrides config)
    #[arg(short, long, env = "JUKEBOX_DATABASE")]
    database: Option<PathBuf>,

    /// Enable debug-only events such as reset
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?
        .with_overrides(args.port, args.database, args.debug);

    // Initialize tracing
    let default_filter = format!("jukebox_player={0},jukebox_common={0},tower_http=info", config.logging.level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting jukebox-player on port {}", config.port);
    info!("Database: {}", config.database_path.display());
    if config.debug {
        info!("Debug mode enabled");
    }

    let pool = db::init::connect(&config.database_path)
        .await
        .context("Failed to open database")?;
    let stores = Stores::sqlite(pool.clone());
    let bus = EventBus::new();

    let player = WebApiPlayer::new(config.remote.api_base_url.clone(), config.request_timeout())
        .context("Failed to create remote player client")?;
    let remote = Arc::new(RemoteSync::new(Arc::new(player), config.retry.clone()));

    let cancel = CancellationToken::new();

    let controller = PlaybackController::start(
        bus.clone(),
        stores.clone(),
        Arc::clone(&remote),
        config.controller_config(),
        cancel.clone(),
    )
    .await
    .context("Failed to start playback controller")?;
    info!("Playback controller initialized");

    let collector = SessionCollector::new(
        stores.sessions.clone(),
        bus.clone(),
        config.gc_interval(),
        config.session_expiration(),
    );
    let collector_task = tokio::spawn(collector.run(cancel.clone()));

    let app = api::create_router(api::AppState {
        bus: bus.clone(),
        stores,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    let shutdown = {
        let cancel = cancel.clone();
        let bus = bus.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
            // Ends every SSE stream so open connections do not hold the server
            bus.shutdown();
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    controller.shutdown().await;
    if let Err(e) = collector_task.await {
        tracing::error!(error = %e, "Session collector task failed");
    }
    remote.cancel_all();
    pool.close().await;

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
