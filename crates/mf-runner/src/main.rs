//! # mf-runner
//!
//! Entry point for the MarketFlow pipeline.
//!
//! Loads a JSON configuration file, builds the configured storage backends,
//! starts one worker per market-data source and runs until Ctrl+C or SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! marketflow config.json --log-level info
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mf_md::Pipeline;
use tracing::{error, info};

/// MarketFlow market data aggregation runner.
#[derive(Parser)]
#[command(name = "marketflow", about = "MarketFlow market data aggregation runner")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output. Overrides `log_path` in the config.
    #[arg(long)]
    log_dir: Option<String>,

    /// Emit console logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenv::dotenv().ok();

    // 1. Configuration, before logging so the log path can come from it
    let config = mf_core::config::load_config(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;

    // 2. Logging
    let log_dir = cli.log_dir.clone().or_else(|| config.log_path());
    mf_core::logging::init_logging(&cli.log_level, log_dir.as_deref(), &config.module_name(), cli.json_logs);
    info!(
        "{} starting: config={}, {} source(s)",
        config.module_name(),
        cli.config.display(),
        config.sources.len()
    );

    // 3. Backends
    let store = mf_store::create_store(&config).await?;
    let sink = mf_store::create_sink(&config).await?;
    let mut pipeline = Pipeline::new(config.sources.clone(), config.pipeline.settings(), store, sink);
    if let Some(publisher) = mf_store::create_publisher(&config) {
        pipeline = pipeline.with_publisher(publisher);
    }
    let pipeline = Arc::new(pipeline);

    // 4. Run until a shutdown signal
    let runner = {
        let p = pipeline.clone();
        tokio::spawn(async move { p.start().await })
    };

    info!("pipeline running, press Ctrl+C to stop");
    shutdown_signal().await?;
    info!("shutdown signal received");
    pipeline.stop();

    match runner.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("pipeline error: {e}"),
        Err(e) => error!("pipeline task panicked: {e}"),
    }

    for (source, health) in pipeline.reconnect_stats().snapshot() {
        info!(
            "source '{source}': {} connect(s), {} failure(s)",
            health.connects, health.total_failures
        );
    }
    info!("pipeline stopped, goodbye");
    Ok(())
}

/// Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = term.recv() => {}
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok(())
    }
}
