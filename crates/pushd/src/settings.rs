//! Effective daemon settings: command-line flags over the config file
//! over built-in defaults.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use pushgrid_core::PushgridConfig;
use pushgrid_core::config::parse_duration;
use pushgrid_store::StoreOptions;

pub const DEFAULT_ADDR: &str = ":8080";
pub const DEFAULT_PERSISTENCE_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_QUEUE_DEPTH: usize = 1024;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Values given explicitly on the command line.
#[derive(Debug, Default)]
pub struct Overrides {
    pub addr: Option<String>,
    pub persistence_file: Option<PathBuf>,
    pub persistence_interval: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub addr: SocketAddr,
    /// `None` when persistence is disabled.
    pub persistence_file: Option<PathBuf>,
    pub persistence_interval: Duration,
    pub request_timeout: Duration,
    pub queue_depth: usize,
    pub shutdown_grace: Duration,
}

impl Settings {
    pub fn resolve(overrides: Overrides, file: PushgridConfig) -> anyhow::Result<Self> {
        let addr = overrides
            .addr
            .or(file.addr)
            .unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let addr = parse_listen_addr(&addr)?;

        // An empty path disables persistence, wherever it came from.
        let persistence_file = overrides
            .persistence_file
            .or(file.persistence.file)
            .filter(|p| !p.as_os_str().is_empty());

        let persistence_interval = match overrides.persistence_interval {
            Some(interval) => interval,
            None => duration_or(
                file.persistence.duration.as_deref(),
                DEFAULT_PERSISTENCE_INTERVAL,
            )
            .context("persistence.duration")?,
        };
        let request_timeout =
            duration_or(file.store.request_timeout.as_deref(), DEFAULT_REQUEST_TIMEOUT)
                .context("store.request_timeout")?;
        let shutdown_grace = duration_or(file.shutdown_grace.as_deref(), DEFAULT_SHUTDOWN_GRACE)
            .context("shutdown_grace")?;

        let queue_depth = file.store.queue_depth.unwrap_or(DEFAULT_QUEUE_DEPTH);
        if queue_depth == 0 {
            bail!("store.queue_depth must be at least 1");
        }

        Ok(Self {
            addr,
            persistence_file,
            persistence_interval,
            request_timeout,
            queue_depth,
            shutdown_grace,
        })
    }

    pub fn store_options(&self) -> StoreOptions {
        let mut options = StoreOptions::default()
            .with_request_timeout(self.request_timeout)
            .with_queue_depth(self.queue_depth);
        if let Some(file) = &self.persistence_file {
            options = options.with_persistence(file, self.persistence_interval);
        }
        options
    }
}

fn duration_or(value: Option<&str>, default: Duration) -> anyhow::Result<Duration> {
    match value {
        Some(s) => Ok(parse_duration(s)?),
        None => Ok(default),
    }
}

/// Parse a listen address. A bare `:port` listens on all interfaces.
pub fn parse_listen_addr(addr: &str) -> anyhow::Result<SocketAddr> {
    if let Some(port) = addr.strip_prefix(':') {
        let port: u16 = port
            .parse()
            .with_context(|| format!("invalid port in listen address {addr:?}"))?;
        return Ok(SocketAddr::from(([0, 0, 0, 0], port)));
    }
    if let Ok(parsed) = addr.parse() {
        return Ok(parsed);
    }
    addr.to_socket_addrs()
        .with_context(|| format!("invalid listen address {addr:?}"))?
        .next()
        .with_context(|| format!("listen address {addr:?} resolved to nothing"))
}
