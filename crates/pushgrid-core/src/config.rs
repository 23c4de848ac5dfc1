//! pushgrid.toml configuration file.
//!
//! Every key is optional; command-line flags take precedence over the
//! file, and built-in defaults fill whatever neither sets.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushgridConfig {
    /// Listen address, e.g. `:8080` or `127.0.0.1:9091`.
    pub addr: Option<String>,
    /// How long in-flight requests get after the listener closes.
    pub shutdown_grace: Option<String>,
    pub persistence: PersistenceConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Snapshot file. Empty or absent keeps metrics in memory only.
    pub file: Option<PathBuf>,
    /// Minimum interval between snapshot writes.
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Bounded wait for a store request.
    pub request_timeout: Option<String>,
    /// Capacity of the store's request queue.
    pub queue_depth: Option<usize>,
}

impl PushgridConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: PushgridConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Parse a duration such as `250ms`, `30s`, `5m`, `1h` or `1m30s`.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(input.to_string());
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        let amount: f64 = rest[..num_end].parse().map_err(|_| invalid())?;
        rest = &rest[num_end..];
        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let seconds_per_unit = match &rest[..unit_end] {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_end..];
        let part = Duration::try_from_secs_f64(amount * seconds_per_unit).map_err(|_| invalid())?;
        total = total.checked_add(part).ok_or_else(invalid)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_file() {
        let toml_str = r#"
addr = ":9091"
shutdown_grace = "2s"

[persistence]
file = "/var/lib/pushgrid/state.redb"
duration = "1m"

[store]
request_timeout = "3s"
queue_depth = 64
"#;
        let config = PushgridConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.addr.as_deref(), Some(":9091"));
        assert_eq!(
            config.persistence.file.as_deref(),
            Some(Path::new("/var/lib/pushgrid/state.redb"))
        );
        assert_eq!(config.store.queue_depth, Some(64));
    }

    #[test]
    fn parse_empty_file() {
        let config = PushgridConfig::from_toml_str("").unwrap();
        assert_eq!(config, PushgridConfig::default());
    }

    #[test]
    fn round_trips_through_toml() {
        let mut config = PushgridConfig::default();
        config.addr = Some(":8080".to_string());
        config.persistence.duration = Some("5m".to_string());
        let text = config.to_toml_string().unwrap();
        assert_eq!(PushgridConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn bad_durations() {
        for bad in ["", "5", "5x", "m", "-1s", "1s2"] {
            assert!(parse_duration(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn overflowing_durations_are_rejected() {
        let huge = format!("{}h", u64::MAX);
        assert!(parse_duration(&huge).is_err());
        // Each part fits on its own but the sum does not.
        let half = format!("{}s", u64::MAX / 2 + 1);
        assert!(parse_duration(&format!("{half}{half}")).is_err());
    }
}
