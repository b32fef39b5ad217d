//! Follows the passive latency feed written to the store by other components.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::LatencyEngine;
use crate::error::Result;
use crate::merger::parse_passive;
use crate::store::passive_key;
use crate::types::Snapshot;

impl LatencyEngine {
    /// Merge every passive report written for `network_id` from now on.
    ///
    /// Only writes made after this call are seen. The task ends when the
    /// store's change channel closes; abort the handle to stop it earlier.
    pub fn spawn_passive_listener(self: &Arc<Self>, network_id: &str) -> JoinHandle<()> {
        let mut changes = self.store.subscribe();
        let engine = Arc::clone(self);
        let network_id = network_id.to_string();
        let key = passive_key(&network_id);

        tokio::spawn(async move {
            info!(network = %network_id, key = %key, "Listening for passive latency");

            loop {
                match changes.recv().await {
                    Ok(change) if change.key == key => {
                        if let Err(e) = engine.handle_passive_payload(&network_id, &change.value).await {
                            warn!(network = %network_id, "Failed to merge passive latency: {}", e);
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(network = %network_id, skipped, "Passive listener fell behind");
                    }
                    Err(RecvError::Closed) => {
                        debug!(network = %network_id, "Store change channel closed");
                        break;
                    }
                }
            }
        })
    }

    /// Decode a raw passive report and merge it.
    ///
    /// A report that is not a JSON object of provider entries is dropped
    /// with a warning and leaves the stored snapshot untouched.
    pub async fn handle_passive_payload(&self, network_id: &str, raw: &str) -> Result<Option<Snapshot>> {
        let updates = match parse_passive(raw) {
            Ok(updates) => updates,
            Err(e) => {
                warn!(network = network_id, "Ignoring malformed passive report: {}", e);
                return Ok(None);
            }
        };

        self.apply_passive(network_id, &updates).await
    }
}
