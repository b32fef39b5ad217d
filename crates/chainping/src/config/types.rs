//! Configuration data structures.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::DEFAULT_GEO_URL;
use crate::types::Endpoint;
use crate::{
    DEFAULT_CACHE_TTL_SECS, DEFAULT_HISTORY_CAPACITY, DEFAULT_INTER_PROBE_DELAY_MS,
    DEFAULT_PROBE_TIMEOUT_MS,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    ReadFailed { path: PathBuf, source: std::io::Error },

    #[error("failed to write {path}: {source}")]
    WriteFailed { path: PathBuf, source: std::io::Error },

    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("no config directory available (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub probe: ProbeSettings,

    #[serde(default)]
    pub geo: GeoSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub networks: Vec<NetworkConfig>,
}

/// Probe timing and history limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Hard timeout for a single probe
    pub timeout_ms: u64,

    /// Pause between consecutive probes of one run
    pub inter_probe_delay_ms: u64,

    /// How long a stored snapshot is served without re-probing
    pub cache_ttl_secs: u64,

    /// Samples kept per provider
    pub history_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoSettings {
    pub enabled: bool,
    pub url: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// SQLite database file; an in-memory store is used when unset
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub format: LogFormat,
    pub level: String,
}

/// A network and the providers probed for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            probe: ProbeSettings::default(),
            geo: GeoSettings::default(),
            storage: StorageSettings::default(),
            logging: LoggingSettings::default(),
            networks: vec![
                NetworkConfig::new("eth")
                    .with_name("Ethereum")
                    .endpoint("Cloudflare", "https://cloudflare-eth.com")
                    .endpoint("LlamaNodes", "https://eth.llamarpc.com")
                    .endpoint("PublicNode", "https://ethereum-rpc.publicnode.com"),
            ],
        }
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            inter_probe_delay_ms: DEFAULT_INTER_PROBE_DELAY_MS,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl ProbeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn inter_probe_delay(&self) -> Duration {
        Duration::from_millis(self.inter_probe_delay_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for GeoSettings {
    fn default() -> Self {
        Self { enabled: true, url: DEFAULT_GEO_URL.to_string(), timeout_ms: DEFAULT_PROBE_TIMEOUT_MS }
    }
}

impl GeoSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { format: LogFormat::Compact, level: "info".to_string() }
    }
}
