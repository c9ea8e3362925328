//! `gateway` binary: loads a `GatewayConfig`, builds the harness, and runs
//! whichever transports the config enables.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gateway")]
#[command(version, about = "Compliance-first tool gateway for AI-agent tool calls", long_about = None)]
struct Cli {
    /// Log filter, e.g. "info" or "gateway_core=debug,gateway_server=info".
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway, serving whichever transports the config enables.
    Serve {
        /// Path to the gateway's YAML config file.
        #[arg(long)]
        config: PathBuf,
    },
    /// Parse and validate a config file, then exit.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Serve { config } => serve(&config).await,
        Commands::CheckConfig { config } => check_config(&config),
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("failed to build log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}

fn check_config(path: &PathBuf) -> Result<()> {
    let config = gateway_core::GatewayConfig::load(path)
        .map_err(|e| anyhow::anyhow!(e.0))
        .context("config is invalid")?;
    println!("config ok: actor={}, tools backed by fs/http/sql connectors", config.actor);
    Ok(())
}

async fn serve(path: &PathBuf) -> Result<()> {
    let config = gateway_core::GatewayConfig::load(path)
        .map_err(|e| anyhow::anyhow!(e.0))
        .context("failed to load config")?;

    let harness = gateway_core::build_harness(&config).context("failed to build harness")?;
    let actor = config.actor.clone();

    let stdio_enabled = config.transport.stdio;
    let http_bind: Option<SocketAddr> = config.transport.http.as_ref().map(|h| h.bind_addr);

    match (stdio_enabled, http_bind) {
        (true, Some(bind_addr)) => {
            let stdio_harness = harness.clone();
            let stdio_actor = actor.clone();
            let http_harness = harness.clone();
            tokio::try_join!(
                gateway_server::serve_stdio(stdio_harness, stdio_actor),
                gateway_server::serve_http(http_harness, actor, bind_addr),
            )?;
        }
        (true, None) => {
            gateway_server::serve_stdio(harness, actor).await?;
        }
        (false, Some(bind_addr)) => {
            gateway_server::serve_http(harness, actor, bind_addr).await?;
        }
        (false, None) => {
            anyhow::bail!("no transport enabled: set transport.stdio or transport.http in the config");
        }
    }

    Ok(())
}
