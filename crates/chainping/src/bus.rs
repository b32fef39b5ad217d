use tokio::sync::broadcast;
use tracing::debug;

use crate::types::{GeoInfo, ProviderRecord, Snapshot};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Progress and results published by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A run began; every provider starts out loading
    RunStarted { network: String, records: Vec<ProviderRecord> },
    /// One provider finished probing during a run
    ProviderMeasured { network: String, record: ProviderRecord },
    /// A run finished and its snapshot was stored
    RunCompleted { network: String, snapshot: Snapshot },
    /// Passive latency was folded into the stored snapshot
    PassiveMerged { network: String, snapshot: Snapshot },
    GeoResolved(GeoInfo),
}

/// Fan-out channel for [`EngineEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: EngineEvent) {
        debug!(event = event_name(&event), "Publishing engine event");
        // Ignore errors if there are no receivers
        let _ = self.tx.send(event);
    }
}

fn event_name(event: &EngineEvent) -> &'static str {
    match event {
        EngineEvent::RunStarted { .. } => "run_started",
        EngineEvent::ProviderMeasured { .. } => "provider_measured",
        EngineEvent::RunCompleted { .. } => "run_completed",
        EngineEvent::PassiveMerged { .. } => "passive_merged",
        EngineEvent::GeoResolved(_) => "geo_resolved",
    }
}
