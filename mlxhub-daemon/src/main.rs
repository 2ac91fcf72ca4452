//! mlxhubd — supervises a fixed catalog of OpenAI-compatible inference
//! servers and exposes their lifecycle over HTTP.

mod http;

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mlxhub_config::load_hub_config;
use mlxhub_core::{runtime::HubRuntime, monitor};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "mlxhubd", about = "Hub Runtime daemon for OpenAI-compatible model sidecars")]
struct Args {
    /// Path to hub.toml.
    #[arg(long, default_value = "hub.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    info!(config = %args.config.display(), "loading hub config");

    let config = load_hub_config(&args.config, &HashMap::new())
        .with_context(|| format!("failed to load hub config at {}", args.config.display()))?;

    let host = config.host.clone();
    let port = config.port;

    let runtime = HubRuntime::new(config, args.config.clone());
    runtime.start_initial_models().await;
    let _monitor = monitor::spawn_monitor(runtime.clone());

    let shutdown = std::sync::Arc::new(tokio::sync::Notify::new());
    let state = http::AppState { runtime: runtime.clone(), shutdown: shutdown.clone() };
    let app = http::router(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "mlxhubd listening");

    let shutdown_signal = async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for SIGINT: {e}");
            }
        };

        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{signal, SignalKind};
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, shutting down"),
            _ = terminate => info!("received SIGTERM, shutting down"),
            _ = shutdown.notified() => info!("shutdown requested via HTTP, stopping listener"),
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("mlxhubd HTTP server failed")?;

    runtime.request_shutdown().await;
    info!("mlxhubd shut down cleanly");
    Ok(())
}
