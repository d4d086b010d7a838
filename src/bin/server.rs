//! # Opsgate Server
//!
//! Standalone HTTP server for the Opsgate API core.
//!
//! ## Usage
//!
//! ```bash
//! opsgate-server --config config/opsgate.toml
//! OPSGATE_ENV=production OPSGATE__WEB__BIND_ADDRESS=0.0.0.0:9000 opsgate-server
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

use opsgate_core::config::ConfigManager;
use opsgate_core::logging;
use opsgate_core::web::{create_app, AppState};

#[derive(Debug, Parser)]
#[command(name = "opsgate-server", version, about = "Opsgate API server")]
struct Cli {
    /// Path to a TOML configuration file (falls back to `OPSGATE_CONFIG_PATH`)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `web.bind_address`
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();
    let cli = Cli::parse();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        build_mode = if cfg!(debug_assertions) { "debug" } else { "release" },
        "Starting Opsgate server"
    );

    let manager = ConfigManager::load(cli.config).context("failed to load configuration")?;
    let mut config = manager.config().clone();
    if let Some(bind) = cli.bind {
        config.web.bind_address = bind;
    }
    let bind_address: SocketAddr = config
        .web
        .bind_address
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.web.bind_address))?;
    let sweep_interval = config.rate_limiting.sweep_interval();

    let state = AppState::builder(config)
        .build()
        .await
        .context("failed to initialize application state")?;

    let sweeper = state.rate_limiters.is_enabled().then(|| {
        state.rate_limiters.spawn_sweeper(sweep_interval)
    });

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;

    info!(
        address = %bind_address,
        environment = manager.environment(),
        "Opsgate server listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    info!("Opsgate server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
