//! tagtrust-server - trust-weighted content tagging and moderation service
//!
//! Startup order: tracing, configuration, database, engine, background
//! reconciliation, HTTP server.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tagtrust_common::config::{load_config, CONFIG_PATH_ENV, DATABASE_PATH_ENV, PORT_ENV};
use tagtrust_common::db::init_database;
use tagtrust_common::events::EventBus;
use tagtrust_server::engine::{spawn_reconciliation_job, Engine, EngineSettings};
use tagtrust_server::{build_router, AppState};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for tagtrust-server
#[derive(Parser, Debug)]
#[command(name = "tagtrust-server")]
#[command(about = "Trust-weighted content tagging and moderation service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// SQLite database file (overrides the config file)
    #[arg(short, long, env = DATABASE_PATH_ENV)]
    database: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = PORT_ENV)]
    port: Option<u16>,

    /// Log filter when RUST_LOG is unset (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(database) = args.database {
        config.database_path = database;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    let log_level = args.log_level.unwrap_or_else(|| config.logging.level.clone());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("tagtrust_server={0},tagtrust_common={0},tower_http={0}", log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting tagtrust-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Database: {}", config.database_path.display());

    let pool = init_database(&config.database_path)
        .await
        .context("Failed to open database")?;

    let event_bus = EventBus::new(config.moderation.event_bus_capacity);
    let engine = Engine::new(pool, event_bus, EngineSettings::from(&config.moderation));

    let reconciler = if config.moderation.reconcile_interval_secs > 0 {
        info!(
            interval_secs = config.moderation.reconcile_interval_secs,
            repair = config.moderation.reconcile_repair,
            "Scheduled reconciliation enabled"
        );
        Some(spawn_reconciliation_job(
            engine.clone(),
            config.moderation.reconcile_interval_secs,
            config.moderation.reconcile_repair,
        ))
    } else {
        info!("Scheduled reconciliation disabled");
        None
    };

    let app = build_router(AppState::new(engine));

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.bind_address, config.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(handle) = reconciler {
        handle.abort();
    }
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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
