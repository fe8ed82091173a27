//! tickscoped: the tickscope daemon.
//!
//! Single binary that assembles the perf pipeline:
//! - Perf store (redb)
//! - HTTP metrics source and procfs memory source
//! - Perf collector
//! - Lifecycle watcher (boot / close markers)
//!
//! # Usage
//!
//! ```text
//! tickscoped run --config /etc/tickscope.toml --data-dir /var/lib/tickscope
//! tickscoped report summary --hours 24
//! ```

mod report;
mod watcher;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use tickscope_collector::{Collector, HttpProcessMonitor, ProcessMonitor, Sources};
use tickscope_core::TickscopeConfig;
use tickscope_metrics::{HttpFetcher, HttpMetricsSource, ProcMemorySource};
use tickscope_state::PerfStore;

use crate::report::ReportView;

#[derive(Parser)]
#[command(name = "tickscoped", about = "tickscope perf collector daemon")]
struct Cli {
    /// Configuration file (TOML). Built-in defaults when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for the perf store.
    #[arg(long, global = true, default_value = "/var/lib/tickscope")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sample the managed process until interrupted.
    Run,
    /// Print a view of the stored perf log as JSON.
    Report {
        #[command(subcommand)]
        view: ReportView,
    },
    /// Print the effective configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tickscope=debug")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Run => run(config, cli.data_dir).await,
        Command::Report { view } => {
            report::run(&config, &config.storage.path_in(&cli.data_dir), &view)
        }
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<TickscopeConfig> {
    match path {
        Some(path) => TickscopeConfig::from_file(path)
            .with_context(|| format!("load config {}", path.display())),
        None => {
            let config = TickscopeConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

async fn run(config: TickscopeConfig, data_dir: PathBuf) -> anyhow::Result<()> {
    info!("tickscope daemon starting");

    // Ensure data directory exists.
    std::fs::create_dir_all(&data_dir)?;
    let db_path = config.storage.path_in(&data_dir);

    // ── Initialize subsystems ──────────────────────────────────

    let store = PerfStore::open_or_recover(&db_path)?;
    info!(path = ?db_path, "perf store opened");

    let fetcher = HttpFetcher::new(config.source.address.clone(), config.source.timeout());
    let monitor: Arc<dyn ProcessMonitor> = Arc::new(HttpProcessMonitor::new(
        fetcher.clone(),
        config.source.players_path.clone(),
        config.source.pid_file.clone(),
    ));
    let sources = Sources {
        metrics: Arc::new(HttpMetricsSource::new(fetcher, config.source.metrics_path.clone())),
        memory: Arc::new(ProcMemorySource::new()),
        monitor: monitor.clone(),
    };
    info!(address = %config.source.address, "sources initialized");

    let collector = Arc::new(Collector::new(&config, store, sources)?);

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let collector_shutdown = shutdown_rx.clone();
    let watcher_shutdown = shutdown_rx;

    // ── Start background tasks ─────────────────────────────────

    let collector_handle = tokio::spawn({
        let collector = collector.clone();
        async move {
            collector.run(collector_shutdown).await;
        }
    });

    let watcher_handle = tokio::spawn(watcher::run(
        collector,
        monitor,
        Duration::from_secs(config.source.poll_interval_secs),
        watcher_shutdown,
    ));

    // ── Wait for shutdown ──────────────────────────────────────

    tokio::signal::ctrl_c()
        .await
        .context("install Ctrl-C handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    // Wait for background tasks.
    let _ = tokio::join!(collector_handle, watcher_handle);

    info!("tickscope daemon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_report_subcommand() {
        let cli = Cli::parse_from(["tickscoped", "report", "summary", "--hours", "6"]);
        assert!(matches!(
            cli.command,
            Command::Report { view: ReportView::Summary { hours: 6, thread: None } }
        ));
        assert_eq!(cli.data_dir, PathBuf::from("/var/lib/tickscope"));
    }

    #[test]
    fn default_config_loads_without_file() {
        let config = load_config(None).unwrap();
        assert_eq!(config.parser.reference_thread, "svMain");
    }
}
