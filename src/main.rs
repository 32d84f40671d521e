use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use awg_exporter::{agent, config};
use clap::{Parser, Subcommand};
use humantime_serde::re::humantime;
use tracing_subscriber::{fmt, EnvFilter};

/// Prometheus exporter for AmneziaWG peer statistics.
#[derive(Parser)]
#[command(name = "awg-exporter", about)]
struct Cli {
    /// Path to the YAML configuration file. Defaults apply without one.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    /// Overrides `log_level` from the config file.
    #[arg(long)]
    log_level: Option<String>,

    /// Metrics listen address, e.g. ":9586" or "127.0.0.1:9586".
    #[arg(long)]
    listen_addr: Option<String>,

    /// Pause between collection cycles, e.g. "30s".
    #[arg(long, value_parser = humantime::parse_duration)]
    poll_interval: Option<Duration>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information and exit.
    Version,
}

/// Build-time version info.
mod version {
    /// Release version string.
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle version subcommand before anything else.
    if let Some(Command::Version) = &cli.command {
        println!("awg-exporter {}", version::full());
        return Ok(());
    }

    let mut cfg = match &cli.config {
        Some(path) => config::Config::load(path)?,
        None => config::Config::default(),
    };

    if let Some(level) = cli.log_level {
        cfg.log_level = level;
    }
    if let Some(addr) = cli.listen_addr {
        cfg.listen_addr = addr;
    }
    if let Some(interval) = cli.poll_interval {
        cfg.poll_interval = interval;
    }
    cfg.validate().context("invalid configuration")?;

    // Initialize tracing.
    let filter = EnvFilter::try_new(&cfg.log_level)
        .with_context(|| format!("invalid log level: {}", cfg.log_level))?;

    fmt().with_env_filter(filter).with_target(true).init();

    tracing::info!(
        version = version::RELEASE,
        commit = version::git_commit(),
        listen_addr = %cfg.listen_addr,
        poll_interval = ?cfg.poll_interval,
        "starting awg-exporter",
    );

    // Build and run the tokio runtime.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(async { run(cfg).await })
}

async fn run(cfg: config::Config) -> Result<()> {
    // Set up signal handling.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("received SIGINT, shutting down");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
            }
        }

        let _ = shutdown_tx.send(());
    });

    let mut agent = agent::Agent::new(cfg)?;
    agent.start().await?;

    // Wait for shutdown signal.
    let _ = shutdown_rx.await;

    agent.stop().await?;

    tracing::info!("awg-exporter stopped");

    Ok(())
}
