//! Loading, validation, and display of configuration.

use std::collections::HashSet;
use std::{env, fmt, fs, path};

use url::Url;

use super::types::{Config, ConfigError, NetworkConfig};
use crate::types::Endpoint;

const MIN_TIMEOUT_MS: u64 = 100;
const MAX_TIMEOUT_MS: u64 = 60_000;

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/chainping/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("chainping/config.toml"))
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Creates a default config in ~/.config/chainping/config.toml, or at the
    /// given path, if none exists yet.
    ///
    /// ```ignore
    /// let cfg = Config::from_config(None::<&std::path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let config = if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            Self::from_toml(&raw)?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            tracing::info!(path = %config_path.display(), "Wrote default configuration");
            config
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::WriteFailed { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })
    }

    /// Look up a configured network
    pub fn network(&self, network_id: &str) -> Option<&NetworkConfig> {
        self.networks.iter().find(|n| n.id == network_id)
    }

    /// Add or replace a network
    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.networks.retain(|n| n.id != network.id);
        self.networks.push(network);
        self
    }

    /// Check settings and endpoint addresses
    pub fn validate(&self) -> Result<(), ConfigError> {
        let probe = &self.probe;
        if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&probe.timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "probe.timeout_ms must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS}, got {}",
                probe.timeout_ms
            )));
        }
        if probe.history_capacity == 0 {
            return Err(ConfigError::Invalid("probe.history_capacity must be at least 1".into()));
        }
        if probe.cache_ttl_secs == 0 {
            return Err(ConfigError::Invalid("probe.cache_ttl_secs must be at least 1".into()));
        }
        if self.geo.enabled && !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&self.geo.timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "geo.timeout_ms must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS}, got {}",
                self.geo.timeout_ms
            )));
        }

        let mut ids = HashSet::new();
        for network in &self.networks {
            if network.id.trim().is_empty() {
                return Err(ConfigError::Invalid("network id must not be empty".into()));
            }
            if !ids.insert(network.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate network id: {}", network.id)));
            }

            let mut providers = HashSet::new();
            for endpoint in &network.endpoints {
                if !providers.insert(endpoint.provider.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "duplicate provider {} in network {}",
                        endpoint.provider, network.id
                    )));
                }
                validate_endpoint_url(&endpoint.url)?;
            }
        }

        Ok(())
    }
}

fn validate_endpoint_url(target: &str) -> Result<(), ConfigError> {
    let url = Url::parse(target)
        .map_err(|e| ConfigError::Invalid(format!("invalid endpoint URL {target}: {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid(format!(
            "endpoint URL {target} must use http or https, got {other}"
        ))),
    }
}

impl NetworkConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), name: None, endpoints: Vec::new() }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append an endpoint to probe
    pub fn endpoint(mut self, provider: impl Into<String>, url: impl Into<String>) -> Self {
        self.endpoints.push(Endpoint::new(provider, url));
        self
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let write_2 = write_indented(2);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Probe")?;
        write_1(f, "Timeout (ms)", &self.probe.timeout_ms)?;
        write_1(f, "Inter-probe Delay (ms)", &self.probe.inter_probe_delay_ms)?;
        write_1(f, "Cache TTL (s)", &self.probe.cache_ttl_secs)?;
        write_1(f, "History Capacity", &self.probe.history_capacity)?;

        write_title_1(f, "Geo")?;
        write_1(f, "Enabled", &self.geo.enabled)?;
        write_1(f, "URL", &self.geo.url)?;

        write_title_1(f, "Storage")?;
        match &self.storage.path {
            Some(path) => write_1(f, "Path", &path.display())?,
            None => write_1(f, "Path", &"(in-memory)")?,
        }

        write_title_1(f, "Networks")?;
        for network in &self.networks {
            let label = network.name.as_deref().unwrap_or(&network.id);
            write_1(f, label, &format!("{} endpoint(s)", network.endpoints.len()))?;
            for endpoint in &network.endpoints {
                write_2(f, &endpoint.provider, &endpoint.url)?;
            }
        }

        Ok(())
    }
}
