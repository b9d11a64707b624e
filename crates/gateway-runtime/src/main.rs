//! # IOBC Gateway
//!
//! Runs the caller and gateway sides of the protocol over an in-process
//! bus until Ctrl+C, or sends a single ping through the full loop with
//! `--ping <user>`.

use anyhow::{Context, Result};
use clap::Parser;
use gateway_runtime::{GatewayConfig, GatewayRuntime};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "gateway-runtime", version, about = "IOBC authenticated request/reply gateway")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, env = "IOBC_CONFIG")]
    config: Option<PathBuf>,

    /// Send one ping as this user, print the reply and exit.
    #[arg(long, value_name = "USER")]
    ping: Option<String>,

    /// Message carried by `--ping`.
    #[arg(long, default_value = "hello")]
    message: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = GatewayConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("Invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    match cli.config.as_deref() {
        Some(path) => info!(path = %path.display(), "Loaded configuration file"),
        None => info!("No configuration file given, using defaults"),
    }

    let runtime = GatewayRuntime::new(config).context("Failed to build gateway")?;
    runtime.start().context("Failed to start gateway")?;

    if let Some(user_id) = cli.ping {
        let result = runtime.client().ping(&user_id, &cli.message).await;
        runtime.shutdown().await;
        let pong = result.with_context(|| format!("Ping as '{user_id}' failed"))?;
        println!("{} (processed at {})", pong.message, pong.time);
        return Ok(());
    }

    info!("Gateway is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;

    Ok(())
}
