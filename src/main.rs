//! Main entry point for the arena-room service
//!
//! Loads configuration, installs logging, starts the arena core with its
//! client gateway and health server, and shuts everything down gracefully on
//! SIGINT or SIGTERM.

use anyhow::Result;
use arena_room::config::{validate_config, AppConfig, PersistenceBackend};
use arena_room::room::DrillEngineFactory;
use arena_room::service::AppState;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info, warn};

/// Arena Room - matchmaking and match lifecycle for a real-time team arena game
#[derive(Parser)]
#[command(
    name = "arena-room",
    version,
    about = "Matchmaking and match-lifecycle engine for a real-time team arena game",
    long_about = "Arena Room queues parties by playlist and region, forms balanced teams within a \
                 widening MMR window, runs ready checks, hosts authoritative match rooms with bot \
                 backfill and reconnection, and settles Elo-style rating changes at match end."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Health port override
    #[arg(long, value_name = "PORT", help = "Override health and metrics port")]
    health_port: Option<u16>,

    /// Gateway port override
    #[arg(long, value_name = "PORT", help = "Override client websocket port")]
    gateway_port: Option<u16>,

    /// Data directory override
    #[arg(long, value_name = "DIR", help = "Override the file backend data directory")]
    data_dir: Option<PathBuf>,

    /// Keep everything in memory
    #[arg(long, help = "Use in-memory persistence (nothing survives a restart)")]
    memory: bool,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("🚀 Arena Room Service");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Gateway: ws://{}/ws", config.gateway_address());
    info!("   Health: http://{}", config.health_address());
    match config.persistence.backend {
        PersistenceBackend::Memory => info!("   Persistence: memory"),
        PersistenceBackend::File => info!(
            "   Persistence: file ({})",
            config.persistence.data_dir.display()
        ),
    }
    info!(
        "   Tick rate: {} Hz, snapshots: {} Hz",
        config.room.tick_rate_hz, config.room.snapshot_rate_hz
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Load and merge configuration from file or environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    // Apply CLI overrides
    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(port) = args.health_port {
        config.service.health_port = port;
    }

    if let Some(port) = args.gateway_port {
        config.service.gateway_port = port;
    }

    if let Some(dir) = &args.data_dir {
        config.persistence.data_dir = dir.clone();
    }

    if args.memory {
        config.persistence.backend = PersistenceBackend::Memory;
    }

    validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {:#}", e);
        std::process::exit(1);
    });

    // Initialize logging early (before any other operations)
    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    display_startup_banner(&config);

    info!("Initializing service components...");
    let mut app_state = match AppState::new(config.clone(), Arc::new(DrillEngineFactory)).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting service...");
    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    info!("✅ Arena Room Service is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    wait_for_shutdown_signal().await;

    info!("🛑 Shutdown signal received, beginning graceful shutdown...");

    // the app bounds each step itself; this caps the whole sequence
    let shutdown_timeout = config.shutdown_timeout() * 3 + Duration::from_secs(1);
    match tokio::time::timeout(shutdown_timeout, app_state.shutdown()).await {
        Ok(Ok(())) => info!("✅ Graceful shutdown completed successfully"),
        Ok(Err(e)) => {
            error!("Shutdown failed: {}", e);
            std::process::exit(1);
        }
        Err(_) => warn!("⚠️  Shutdown timeout exceeded, forcing exit"),
    }

    info!("🛑 Arena Room Service stopped");
    Ok(())
}
