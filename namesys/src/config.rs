use std::{path::Path, time::Duration};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use record::latest_eol;

use crate::bootstrap::BootstrapConfig;

pub const DEFAULT_RECORD_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_REPUBLISH_INTERVAL_SECS: u64 = 4 * 60 * 60;
pub const DEFAULT_RECORD_LIFETIME_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_BOOTSTRAP_FIND_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_BOOTSTRAP_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_BOOTSTRAP_PROVIDER_LIMIT: usize = 10;
pub const DEFAULT_DEPTH_LIMIT: usize = 32;
pub const DEFAULT_FOLLOW_INTERVAL_SECS: u64 = 60 * 60;
pub const DEFAULT_FOLLOW_RESOLVE_TIMEOUT_SECS: u64 = 60;

/// Tunables of the name system, loadable from YAML.
///
/// Every field is optional in the file; missing fields take their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamesysConfig {
    /// Validity of records created by `publish`.
    pub record_ttl_secs: u64,
    /// Period of the durable republish cycle.
    pub republish_interval_secs: u64,
    /// Validity given to records when they are republished.
    pub record_lifetime_secs: u64,
    pub bootstrap_find_timeout_secs: u64,
    pub bootstrap_connect_timeout_secs: u64,
    pub bootstrap_provider_limit: usize,
    /// Maximum number of hops followed by recursive resolution.
    pub depth_limit: usize,
    /// How often followed names are re-resolved.
    pub follow_interval_secs: u64,
    pub follow_resolve_timeout_secs: u64,
}

impl Default for NamesysConfig {
    fn default() -> Self {
        Self {
            record_ttl_secs: DEFAULT_RECORD_TTL_SECS,
            republish_interval_secs: DEFAULT_REPUBLISH_INTERVAL_SECS,
            record_lifetime_secs: DEFAULT_RECORD_LIFETIME_SECS,
            bootstrap_find_timeout_secs: DEFAULT_BOOTSTRAP_FIND_TIMEOUT_SECS,
            bootstrap_connect_timeout_secs: DEFAULT_BOOTSTRAP_CONNECT_TIMEOUT_SECS,
            bootstrap_provider_limit: DEFAULT_BOOTSTRAP_PROVIDER_LIMIT,
            depth_limit: DEFAULT_DEPTH_LIMIT,
            follow_interval_secs: DEFAULT_FOLLOW_INTERVAL_SECS,
            follow_resolve_timeout_secs: DEFAULT_FOLLOW_RESOLVE_TIMEOUT_SECS,
        }
    }
}

impl NamesysConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("invalid name system config")?;
        config.validate()?;
        Ok(config)
    }

    /// Periods drive tokio intervals, which cannot tick every zero seconds.
    pub fn validate(&self) -> Result<()> {
        if self.republish_interval_secs == 0 {
            bail!("republish_interval_secs must be greater than zero");
        }
        if self.follow_interval_secs == 0 {
            bail!("follow_interval_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn record_ttl(&self) -> Duration {
        Duration::from_secs(self.record_ttl_secs)
    }

    pub fn republish_interval(&self) -> Duration {
        Duration::from_secs(self.republish_interval_secs)
    }

    pub fn record_lifetime(&self) -> Duration {
        Duration::from_secs(self.record_lifetime_secs)
    }

    pub fn follow_interval(&self) -> Duration {
        Duration::from_secs(self.follow_interval_secs)
    }

    pub fn follow_resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.follow_resolve_timeout_secs)
    }

    pub fn bootstrap(&self) -> BootstrapConfig {
        BootstrapConfig {
            find_timeout: Duration::from_secs(self.bootstrap_find_timeout_secs),
            connect_timeout: Duration::from_secs(self.bootstrap_connect_timeout_secs),
            provider_limit: self.bootstrap_provider_limit,
        }
    }
}

/// End of life `lifetime` from now, clamped to the latest EOL a record can carry.
pub fn eol_after(lifetime: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(lifetime)
        .ok()
        .and_then(|delta| Utc::now().checked_add_signed(delta))
        .filter(|eol| *eol <= latest_eol())
        .unwrap_or_else(latest_eol)
}
