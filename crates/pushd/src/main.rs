//! pushd — the Pushgrid daemon.
//!
//! Accepts metric pushes from batch and short-lived jobs and serves the
//! merged result for scraping.
//!
//! # Usage
//!
//! ```text
//! pushd --addr :9091 --persistence.file /var/lib/pushgrid/metrics.redb
//! ```

mod settings;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use pushgrid_core::PushgridConfig;
use pushgrid_core::config::parse_duration;
use pushgrid_store::MetricStore;

use settings::{Overrides, Settings};

const DEFAULT_LOG_FILTER: &str = "info,pushd=debug,pushgrid=debug";

#[derive(Parser)]
#[command(name = "pushd", about = "Pushgrid push gateway daemon")]
struct Cli {
    /// Address to listen on; `:port` listens on all interfaces.
    #[arg(long)]
    addr: Option<String>,

    /// File to persist metrics to. Empty keeps metrics in memory only.
    #[arg(long = "persistence.file")]
    persistence_file: Option<PathBuf>,

    /// Minimum interval between writes to the persistence file.
    #[arg(long = "persistence.duration", value_parser = parse_duration)]
    persistence_duration: Option<Duration>,

    /// TOML configuration file; flags take precedence over it.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => PushgridConfig::from_file(path)?,
        None => PushgridConfig::default(),
    };
    let settings = Settings::resolve(
        Overrides {
            addr: cli.addr,
            persistence_file: cli.persistence_file,
            persistence_interval: cli.persistence_duration,
        },
        file,
    )?;

    run(settings).await
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    info!(
        addr = %settings.addr,
        persistence_file = ?settings.persistence_file,
        persistence_interval_ms = settings.persistence_interval.as_millis() as u64,
        "Pushgrid daemon starting"
    );

    // ── Store ──────────────────────────────────────────────────

    let store = MetricStore::open(settings.store_options()).await;

    // ── API server ─────────────────────────────────────────────

    let router = pushgrid_api::build_router(store.clone());
    let listener = tokio::net::TcpListener::bind(settings.addr).await?;
    info!(addr = %settings.addr, "listening");

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            })
            .await
    });

    // ── Shutdown ───────────────────────────────────────────────

    let mut server_result = None;
    tokio::select! {
        signal = wait_for_signal() => {
            if let Err(e) = signal {
                error!(error = %e, "signal handling failed; shutting down");
            }
        }
        result = &mut server => {
            server_result = Some(result);
        }
    }

    if server_result.is_none() {
        // Stop accepting, then give in-flight requests the grace period.
        let _ = shutdown_tx.send(true);
        match tokio::time::timeout(settings.shutdown_grace, &mut server).await {
            Ok(result) => server_result = Some(result),
            Err(_) => {
                warn!(
                    grace_ms = settings.shutdown_grace.as_millis() as u64,
                    "in-flight requests did not finish in time; aborting them"
                );
                server.abort();
            }
        }
    }

    // The listener is closed; the store takes no more work after this.
    if let Err(e) = store.shutdown().await {
        error!(error = %e, "metric store shutdown failed");
    }

    match server_result {
        Some(Ok(Err(e))) => Err(e.into()),
        Some(Err(e)) if e.is_panic() => Err(anyhow::anyhow!("API server panicked: {e}")),
        _ => {
            info!("Pushgrid daemon stopped");
            Ok(())
        }
    }
}

/// Resolve on SIGINT, or SIGTERM on unix.
async fn wait_for_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("received SIGINT");
            }
            _ = terminate.recv() => {
                info!("received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("received Ctrl-C");
    }

    Ok(())
}
