use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;

/// Library-level error.
///
/// Probe failures never surface here; they are captured on the provider
/// record. What remains are setup problems and storage faults on paths that
/// cannot fall back to a cache miss.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
