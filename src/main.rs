use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use unigate::http::HttpServer;
use unigate::{Config, Gateway};

/// HTTP gateway over the enrollment, grading and library databases
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file (default: <config dir>/unigate/unigate.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("unigate=info")),
        )
        .init();

    let cli = Cli::parse();

    let path = cli.config.unwrap_or_else(Config::default_path);
    let mut config = Config::load(&path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    for store in config.missing_stores() {
        warn!(%store, "no backend configured; requests that need it will fail");
    }

    let selector = config
        .build_selector()
        .context("configuring backend pools")?;
    let gateway = Arc::new(Gateway::new(selector, config.policy.clone()));
    info!(
        backends = gateway.selector().backends().len(),
        "gateway ready"
    );

    HttpServer::with_config(config.server, gateway)
        .start()
        .await
        .context("HTTP server failed")?;
    Ok(())
}
