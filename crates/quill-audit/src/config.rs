//! Auditor configuration, parsed from TOML.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Error loading an [`AuditorConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("couldn't read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML for this schema.
    #[error("couldn't parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Auditor configuration.
///
/// All intervals are in seconds; `0` disables the corresponding periodic
/// task, except the bookie check, where `0` means "run once at startup,
/// then never periodically".
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AuditorConfig {
    /// Cadence of the full all-ledgers check.
    pub periodic_check_interval_secs: u64,
    /// Cadence of the bookie audit.
    pub periodic_bookie_check_interval_secs: u64,
    /// Cadence of the under-replicated snapshot refresh.
    pub ur_ledger_check_interval_secs: u64,
    /// How long a registered bookie may go without a heartbeat before the
    /// self-constructed registry treats it as stale.
    pub stale_bookie_window_secs: u64,
    /// Metadata store endpoints for dedicated admin sessions.
    pub meta_endpoints: Vec<String>,
    /// Metadata session timeout in milliseconds.
    pub meta_session_timeout_ms: u64,
}

impl Default for AuditorConfig {
    fn default() -> Self {
        Self {
            periodic_check_interval_secs: 604_800, // weekly
            periodic_bookie_check_interval_secs: 86_400, // daily
            ur_ledger_check_interval_secs: 60,
            stale_bookie_window_secs: 300,
            meta_endpoints: vec!["127.0.0.1:2181".to_string()],
            meta_session_timeout_ms: 10_000,
        }
    }
}

impl AuditorConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml(&content)?)
    }

    /// Parse config from a TOML string.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Ledger check interval; `None` when disabled.
    pub fn ledger_check_interval(&self) -> Option<Duration> {
        interval(self.periodic_check_interval_secs)
    }

    /// Bookie check interval; `None` means run-once at startup.
    pub fn bookie_check_interval(&self) -> Option<Duration> {
        interval(self.periodic_bookie_check_interval_secs)
    }

    /// Under-replicated snapshot interval; `None` when disabled.
    pub fn ur_check_interval(&self) -> Option<Duration> {
        interval(self.ur_ledger_check_interval_secs)
    }

    /// Staleness window for the self-constructed bookie registry.
    pub fn stale_window(&self) -> Duration {
        Duration::from_secs(self.stale_bookie_window_secs)
    }

    /// Metadata session timeout.
    pub fn meta_session_timeout(&self) -> Duration {
        Duration::from_millis(self.meta_session_timeout_ms)
    }
}

fn interval(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}
