use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vector_rules_app_server::{Config, serve};
use vector_rules_retrieval::RuleEngine;

/// Store rules and retrieve the ones most similar to a set of queries.
#[derive(Debug, Parser)]
#[command(name = "vector-rules-server", version)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, short)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let engine = RuleEngine::new(config.retrieval.clone())
        .await
        .context("failed to initialize the rule engine")?;

    let addr = config.server.http_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {err}");
            return;
        }
        info!("Shutdown requested");
        signal.cancel();
    });

    serve(listener, Arc::new(engine), shutdown).await?;
    Ok(())
}
