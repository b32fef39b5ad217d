//! chainping - latency probing for blockchain RPC endpoints
//!
//! This library measures round-trip latency from a single observation point
//! to the RPC providers configured for a network, keeps a short rolling
//! history per provider, caches the last full run, and folds in latency
//! reported by an external passive source.

pub mod aggregator;
pub mod bus;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod merger;
pub mod probe;
pub mod store;
pub mod types;

// Re-export main types
pub use config::{Config, NetworkConfig, NetworkDirectory, ProbeSettings};
pub use engine::{LatencyEngine, RunOutcome};
pub use error::{Error, Result};
pub use types::{Endpoint, ErrorKind, GeoInfo, ProbeOutcome, ProviderRecord, ProviderStatus, Snapshot};

/// Hard ceiling for a single probe
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;

/// Pause inserted between consecutive probes of one run
pub const DEFAULT_INTER_PROBE_DELAY_MS: u64 = 300;

/// How long a stored snapshot is served without re-probing
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Number of samples retained per provider
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;
