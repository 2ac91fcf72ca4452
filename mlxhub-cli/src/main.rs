//! mlxhub — operator CLI for a running (or about-to-run) Hub Runtime daemon.

mod client;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use client::HubClient;

#[derive(Parser, Debug)]
#[command(name = "mlxhub", about = "Control a mlx-hub daemon (mlxhubd)")]
struct Cli {
    /// Daemon host to connect to.
    #[arg(long, global = true, default_value = "127.0.0.1")]
    host: String,

    /// Daemon port to connect to.
    #[arg(long, global = true, default_value_t = 8700)]
    port: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Launch `mlxhubd` in the foreground with the given config.
    Start {
        #[arg(long, default_value = "hub.toml")]
        config: PathBuf,
    },
    /// Print the current hub status.
    Status,
    /// Re-read hub.toml and apply the changes.
    Reload,
    /// Stop every running model and stop the daemon.
    Shutdown,
    /// Stop every running model, leaving the daemon up.
    Stop,
    /// Start a single model.
    StartModel { name: String },
    /// Stop a single model.
    StopModel { name: String },
    /// Load a JIT-enabled model.
    LoadModel { name: String },
    /// Unload a JIT-enabled model.
    UnloadModel { name: String },
    /// Poll and print status on an interval until interrupted.
    Watch {
        #[arg(long, default_value_t = 2)]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).compact().init();

    let cli = Cli::parse();

    if let Command::Start { config } = &cli.command {
        return run_daemon(config).await;
    }

    let client = HubClient::new(&cli.host, cli.port);
    match cli.command {
        Command::Start { .. } => unreachable!(),
        Command::Status => {
            let status = client.status().await?;
            print_status(&status);
        }
        Command::Reload => {
            let status = client.reload().await?;
            print_status(&status);
        }
        Command::Shutdown => {
            let detail = client.shutdown().await?;
            println!("{}", detail.detail);
        }
        Command::Stop => {
            let detail = client.stop_all_models().await?;
            println!("{}", detail.detail);
        }
        Command::StartModel { name } => {
            let detail = client.start_model(&name).await?;
            println!("{}", detail.detail);
        }
        Command::StopModel { name } => {
            let detail = client.stop_model(&name).await?;
            println!("{}", detail.detail);
        }
        Command::LoadModel { name } => {
            let detail = client.load_model(&name).await?;
            println!("{}", detail.detail);
        }
        Command::UnloadModel { name } => {
            let detail = client.unload_model(&name).await?;
            println!("{}", detail.detail);
        }
        Command::Watch { interval } => {
            loop {
                match client.status().await {
                    Ok(status) => {
                        print_status(&status);
                        println!();
                    }
                    Err(err) => println!("error: {err}"),
                }
                tokio::time::sleep(Duration::from_secs(interval)).await;
            }
        }
    }

    Ok(())
}

/// Spawns `mlxhubd` (resolved from `MLXHUB_DAEMON_BIN`, default `mlxhubd`)
/// as a foreground child, inheriting stdio, and waits for it to exit. This
/// is the Rust equivalent of the reference CLI's in-process `start`
/// command — the daemon here is a separate binary rather than an embedded
/// web server, so the CLI supervises it as a child instead.
async fn run_daemon(config: &PathBuf) -> Result<()> {
    let binary = std::env::var("MLXHUB_DAEMON_BIN").unwrap_or_else(|_| "mlxhubd".to_string());
    let status = tokio::process::Command::new(&binary)
        .arg("--config")
        .arg(config)
        .status()
        .await
        .with_context(|| format!("failed to launch {binary}"))?;

    if !status.success() {
        anyhow::bail!("{binary} exited with {status}");
    }
    Ok(())
}

fn print_status(status: &mlxhub_wire::StatusPayload) {
    println!(
        "hub: {}:{} (status page: {})",
        status.host, status.port, status.enable_status_page
    );
    println!("{:<16} {:<10} {:<8} {:<8} {:<10}", "name", "status", "port", "pid", "group");
    for model in &status.models {
        println!(
            "{:<16} {:<10} {:<8} {:<8} {:<10}",
            model.name,
            model.status,
            model.port,
            model.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
            model.group.clone().unwrap_or_else(|| "-".to_string()),
        );
    }
    for group in &status.groups {
        println!(
            "group {}: {}/{} running{}",
            group.name,
            group.running,
            group.total,
            group
                .max_loaded
                .map(|m| format!(" (max {m})"))
                .unwrap_or_default(),
        );
    }
}
