//! broker.toml configuration parser.
//!
//! Every section is optional; a missing file section falls back to its
//! `Default`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub store: StoreConfig,
    pub bus: BusConfig,
    pub recovery: RecoveryConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the redb file holding all broker objects.
    pub path: PathBuf,
    /// Namespace every object is written under.
    pub namespace: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/broker/broker.redb"),
            namespace: "broker".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Buffered notifications per method before publishers wait.
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Seconds between periodic recovery scans. Zero disables the loop;
    /// the startup scan still runs.
    pub interval_secs: u64,
    /// Re-run instance cleanup for succeeded deprovision jobs whose
    /// service instance still exists. Unbind jobs are not reconciled.
    pub reconcile: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            reconcile: true,
        }
    }
}

impl RecoveryConfig {
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info,broker_state=debug,broker_jobs=debug,brokerd=debug".to_string(),
            json: false,
        }
    }
}

impl BrokerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BrokerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: BrokerConfig = toml::from_str("").unwrap();
        assert_eq!(config, BrokerConfig::default());
        assert_eq!(config.bus.capacity, 64);
        assert_eq!(config.recovery.interval(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_parse_partial() {
        let toml_str = r#"
[store]
namespace = "openshift-broker"

[recovery]
interval_secs = 0
"#;
        let config: BrokerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.store.namespace, "openshift-broker");
        assert_eq!(config.store.path, StoreConfig::default().path);
        assert_eq!(config.recovery.interval(), None);
        assert!(config.recovery.reconcile);
    }

    #[test]
    fn test_round_trip_through_toml() {
        let mut config = BrokerConfig::default();
        config.log.json = true;
        let toml_str = config.to_toml_string().unwrap();
        let parsed: BrokerConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }
}
