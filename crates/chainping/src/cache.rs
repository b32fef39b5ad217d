//! Time-boxed snapshot cache on top of a [`KeyValueStore`].
//!
//! Unreadable or malformed entries behave like a miss. Stale entries are left
//! in place; they still seed passive merges but are never served as a result.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::aggregator::Aggregator;
use crate::error::Result;
use crate::store::{KeyValueStore, snapshot_key};
use crate::types::Snapshot;

pub struct SnapshotCache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    aggregator: Aggregator,
}

impl SnapshotCache {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration, aggregator: Aggregator) -> Self {
        Self { store, ttl, aggregator }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Last snapshot for the network, if it is still fresh
    pub async fn load(&self, network_id: &str) -> Option<Snapshot> {
        self.load_at(network_id, chrono::Utc::now().timestamp_millis()).await
    }

    /// Same as [`load`](Self::load), judged against `now_ms`
    pub async fn load_at(&self, network_id: &str, now_ms: i64) -> Option<Snapshot> {
        let snapshot = self.load_any(network_id).await?;

        if snapshot.is_fresh_at(now_ms, self.ttl) {
            Some(snapshot)
        } else {
            debug!(
                network = network_id,
                age_ms = now_ms - snapshot.timestamp,
                "Cached snapshot is stale"
            );
            None
        }
    }

    /// Last snapshot for the network regardless of age
    pub async fn load_any(&self, network_id: &str) -> Option<Snapshot> {
        let key = snapshot_key(network_id);

        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(network = network_id, "Failed to read cached snapshot: {}", e);
                return None;
            }
        };

        self.decode(network_id, &raw)
    }

    /// Persist a snapshot as the network's current result set
    pub async fn save(&self, network_id: &str, snapshot: &Snapshot) -> Result<()> {
        let raw = serde_json::to_string(snapshot)?;
        self.store.set(&snapshot_key(network_id), &raw).await?;

        debug!(network = network_id, providers = snapshot.results.len(), "Saved snapshot");
        Ok(())
    }

    fn decode(&self, network_id: &str, raw: &str) -> Option<Snapshot> {
        match serde_json::from_str::<Snapshot>(raw) {
            Ok(mut snapshot) => {
                for record in &mut snapshot.results {
                    self.aggregator.normalize(record);
                }
                Some(snapshot)
            }
            Err(e) => {
                warn!(network = network_id, "Ignoring malformed cached snapshot: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{Endpoint, ProviderRecord};

    const NOW: i64 = 1_700_000_000_000;

    fn cache(store: Arc<MemoryStore>) -> SnapshotCache {
        SnapshotCache::new(store, Duration::from_secs(300), Aggregator::default())
    }

    fn snapshot_at(timestamp: i64) -> Snapshot {
        let aggregator = Aggregator::default();
        let mut record = ProviderRecord::loading(&Endpoint::new("A", "https://a.example"));
        aggregator.push_sample(&mut record, 120);
        Snapshot::at(vec![record], timestamp)
    }

    #[tokio::test]
    async fn test_ttl_boundary() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache(store);

        cache.save("eth", &snapshot_at(NOW - 299_000)).await.unwrap();
        assert!(cache.load_at("eth", NOW).await.is_some());

        cache.save("eth", &snapshot_at(NOW - 301_000)).await.unwrap();
        assert!(cache.load_at("eth", NOW).await.is_none());
    }

    #[tokio::test]
    async fn test_stale_entry_is_not_deleted() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache(store.clone());
        let stale = snapshot_at(NOW - 600_000);

        cache.save("eth", &stale).await.unwrap();

        assert!(cache.load_at("eth", NOW).await.is_none());
        assert_eq!(cache.load_any("eth").await, Some(stale));
        assert!(store.get("latency-results-eth").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_malformed_entry_is_a_miss() {
        let store = Arc::new(MemoryStore::new());
        store.set("latency-results-eth", "{not json").await.unwrap();
        let cache = cache(store);

        assert!(cache.load_any("eth").await.is_none());
        assert!(cache.load("eth").await.is_none());
    }

    #[tokio::test]
    async fn test_fresh_snapshot_round_trips() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache(store);
        let snapshot = Snapshot::new(snapshot_at(0).results);

        cache.save("eth", &snapshot).await.unwrap();

        assert_eq!(cache.load("eth").await, Some(snapshot));
        assert!(cache.load("base").await.is_none());
    }
}
