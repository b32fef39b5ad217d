//! Configuration for chainping.
//!
//! Settings are read from a TOML file; the loaded [`Config`] also serves as
//! the directory of networks and their endpoints.

mod methods;
mod types;

pub use types::{
    Config, ConfigError, GeoSettings, LogFormat, LoggingSettings, NetworkConfig, ProbeSettings,
    StorageSettings,
};

use crate::types::Endpoint;

/// Resolves a network id to the ordered endpoints to probe
pub trait NetworkDirectory: Send + Sync {
    /// Endpoints for the network, or `None` if the network is not configured
    fn endpoints(&self, network_id: &str) -> Option<Vec<Endpoint>>;
}

impl NetworkDirectory for Config {
    fn endpoints(&self, network_id: &str) -> Option<Vec<Endpoint>> {
        self.network(network_id).map(|network| network.endpoints.clone())
    }
}
