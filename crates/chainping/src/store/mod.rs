//! Key-value persistence for snapshots and passive latency feeds.
//!
//! Every backend broadcasts each write on a change channel so the passive
//! listener can follow keys written by other components.

pub mod memory;
mod migrations;
mod pool;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

/// Capacity of each backend's change channel
pub(crate) const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database query failed: {0}")]
    Database(#[from] libsql::Error),

    #[error("failed to check out a connection: {0}")]
    Checkout(#[from] deadpool::managed::PoolError<libsql::Error>),

    #[error("failed to build connection pool: {0}")]
    Pool(String),
}

/// A write observed on a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: String,
    pub value: String,
}

/// String key-value store with change notification
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key` and notify subscribers
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Receive every subsequent write to this store
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// Key holding the last snapshot for a network
pub fn snapshot_key(network_id: &str) -> String {
    format!("latency-results-{network_id}")
}

/// Key the passive latency source writes to for a network
pub fn passive_key(network_id: &str) -> String {
    format!("blockheight-latency-{network_id}")
}

pub(crate) fn publish(tx: &broadcast::Sender<StoreChange>, key: &str, value: &str) {
    // Nobody listening is fine
    let _ = tx.send(StoreChange { key: key.to_string(), value: value.to_string() });
}
