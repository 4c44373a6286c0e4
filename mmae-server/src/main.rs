use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use mmae_core::init_tracing_with_options;
use mmae_server::{AppConfig, AppState, build_router, spawn_sweeper};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "mmae-server", version, about = "Audio region extraction server")]
struct Args {
    /// Path to mmae.config.toml.
    #[arg(long, env = "MMAE_CONFIG_PATH")]
    config: Option<PathBuf>,
    /// Overrides `server.bind`.
    #[arg(long)]
    bind: Option<String>,
    /// Overrides `diagnostics.log_dir`.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (mut config, source) = AppConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(log_dir) = args.log_dir {
        config.diagnostics.log_dir = log_dir;
    }

    let telemetry = init_tracing_with_options(
        &config.diagnostics.log_dir,
        &config.diagnostics.trace_file_prefix,
        &config.diagnostics.rust_log_filter,
    )?;
    info!(
        session_id = %telemetry.session_id,
        log_file = %telemetry.log_file.display(),
        "tracing initialised"
    );
    match &source {
        Some(path) => info!(path = %path.display(), "configuration loaded"),
        None => warn!("no configuration file found; using defaults"),
    }

    let state = AppState::from_config(&config)?;
    let _sweeper = spawn_sweeper(
        state.clone(),
        Duration::from_secs(config.registry.sweep_interval_secs),
    );
    let app = build_router(state, &config.server);

    let listener = TcpListener::bind(config.server.bind.as_str())
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    info!(addr = %config.server.bind, "mmae-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("mmae-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received ctrl-c"),
        () = terminate => info!("received SIGTERM"),
    }
}
