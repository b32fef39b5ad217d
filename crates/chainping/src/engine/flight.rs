//! Per-network concurrency guards.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OwnedMutexGuard;

use crate::types::ProviderRecord;

type Flights = HashMap<String, Vec<ProviderRecord>>;

fn lock(flights: &Mutex<Flights>) -> MutexGuard<'_, Flights> {
    flights.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tracks which networks have a run in flight, along with its live records
#[derive(Debug, Default)]
pub(crate) struct FlightMap {
    inner: Arc<Mutex<Flights>>,
}

impl FlightMap {
    /// Claim the network, or `None` if a run already holds it
    pub(crate) fn try_begin(&self, network_id: &str) -> Option<FlightGuard> {
        let mut flights = lock(&self.inner);
        if flights.contains_key(network_id) {
            return None;
        }
        flights.insert(network_id.to_string(), Vec::new());

        Some(FlightGuard { network_id: network_id.to_string(), inner: Arc::clone(&self.inner) })
    }

    pub(crate) fn is_running(&self, network_id: &str) -> bool {
        lock(&self.inner).contains_key(network_id)
    }

    pub(crate) fn progress(&self, network_id: &str) -> Option<Vec<ProviderRecord>> {
        lock(&self.inner).get(network_id).cloned()
    }
}

/// Held for the duration of a run; dropping it releases the network
#[derive(Debug)]
pub(crate) struct FlightGuard {
    network_id: String,
    inner: Arc<Mutex<Flights>>,
}

impl FlightGuard {
    pub(crate) fn set_progress(&self, records: Vec<ProviderRecord>) {
        lock(&self.inner).insert(self.network_id.clone(), records);
    }

    pub(crate) fn update(&self, index: usize, record: ProviderRecord) {
        if let Some(slot) =
            lock(&self.inner).get_mut(&self.network_id).and_then(|records| records.get_mut(index))
        {
            *slot = record;
        }
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        lock(&self.inner).remove(&self.network_id);
    }
}

/// One async mutex per network, serializing snapshot read-modify-write
#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    pub(crate) async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}
