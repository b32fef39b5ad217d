//! Engine module - drives latency tests and passive merges
//!
//! The engine is the core coordinator that:
//! - Serves fresh cached snapshots without probing
//! - Probes a network's endpoints one at a time, pausing between probes
//! - Resolves the observer location alongside the probe loop
//! - Folds passive latency reports into the stored snapshot
//!
//! A network has at most one run in flight. Every write of a network's
//! snapshot, whether from a run or a passive merge, holds that network's
//! write lock. A run writes each provider's record as soon as it is probed,
//! so writes for one provider land in the order they were observed.

mod flight;
mod passive;

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use self::flight::{FlightGuard, FlightMap, KeyedLocks};
use crate::aggregator::Aggregator;
use crate::bus::{EngineEvent, EventBus};
use crate::cache::SnapshotCache;
use crate::config::{Config, GeoSettings, NetworkDirectory, ProbeSettings};
use crate::error::Result;
use crate::geo::{self, GeoLookup, IpApiLookup};
use crate::merger::{PassiveUpdates, reconcile};
use crate::probe::{HttpClient, ReqwestClient, Sampler};
use crate::store::{KeyValueStore, MemoryStore};
use crate::types::{Endpoint, GeoInfo, ProviderRecord, Snapshot};

/// What a call to [`LatencyEngine::run_latency_test`] did
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// A fresh snapshot was already stored; nothing was probed
    Cached(Snapshot),
    /// Every endpoint was probed and the new snapshot stored
    Measured(Snapshot),
    /// Another run for this network is still in flight
    InProgress,
    /// The network is not configured
    UnknownNetwork,
}

impl RunOutcome {
    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            RunOutcome::Cached(snapshot) | RunOutcome::Measured(snapshot) => Some(snapshot),
            RunOutcome::InProgress | RunOutcome::UnknownNetwork => None,
        }
    }

    pub fn into_snapshot(self) -> Option<Snapshot> {
        match self {
            RunOutcome::Cached(snapshot) | RunOutcome::Measured(snapshot) => Some(snapshot),
            RunOutcome::InProgress | RunOutcome::UnknownNetwork => None,
        }
    }
}

/// Latency measurement engine for a set of networks
pub struct LatencyEngine {
    settings: ProbeSettings,
    networks: Arc<dyn NetworkDirectory>,
    store: Arc<dyn KeyValueStore>,
    sampler: Sampler,
    aggregator: Aggregator,
    cache: SnapshotCache,
    geo: Option<Arc<dyn GeoLookup>>,
    geo_timeout: Duration,
    flights: FlightMap,
    write_locks: KeyedLocks,
    has_results: RwLock<HashSet<String>>,
    geo_info: RwLock<Option<GeoInfo>>,
    bus: EventBus,
}

/// Builder for [`LatencyEngine`]
pub struct EngineBuilder {
    settings: ProbeSettings,
    networks: Arc<dyn NetworkDirectory>,
    store: Option<Arc<dyn KeyValueStore>>,
    client: Option<Arc<dyn HttpClient>>,
    geo: Option<Arc<dyn GeoLookup>>,
    geo_timeout: Duration,
}

impl EngineBuilder {
    /// Set probe timing and history limits
    pub fn settings(mut self, settings: ProbeSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the backing store (defaults to an in-memory store)
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the HTTP client used for probes (defaults to reqwest)
    pub fn client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Enable observer location lookups
    pub fn geo(mut self, geo: Arc<dyn GeoLookup>) -> Self {
        self.geo = Some(geo);
        self
    }

    /// Longest a location lookup may hold up a run
    pub fn geo_timeout(mut self, geo_timeout: Duration) -> Self {
        self.geo_timeout = geo_timeout;
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<LatencyEngine> {
        let client: Arc<dyn HttpClient> = match self.client {
            Some(client) => client,
            None => Arc::new(ReqwestClient::new()?),
        };
        let store: Arc<dyn KeyValueStore> =
            self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));

        let aggregator = Aggregator::new(self.settings.history_capacity);
        let cache = SnapshotCache::new(Arc::clone(&store), self.settings.cache_ttl(), aggregator);

        Ok(LatencyEngine {
            sampler: Sampler::new(client, self.settings.timeout()),
            settings: self.settings,
            networks: self.networks,
            store,
            aggregator,
            cache,
            geo: self.geo,
            geo_timeout: self.geo_timeout,
            flights: FlightMap::default(),
            write_locks: KeyedLocks::default(),
            has_results: RwLock::new(HashSet::new()),
            geo_info: RwLock::new(None),
            bus: EventBus::new(),
        })
    }
}

impl LatencyEngine {
    /// Start building an engine over the given networks
    pub fn builder(networks: Arc<dyn NetworkDirectory>) -> EngineBuilder {
        EngineBuilder {
            settings: ProbeSettings::default(),
            networks,
            store: None,
            client: None,
            geo: None,
            geo_timeout: GeoSettings::default().timeout(),
        }
    }

    /// Build an engine with the production HTTP client and geo lookup
    pub fn from_config(config: Config, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let settings = config.probe.clone();
        let geo_settings = config.geo.clone();

        let geo_timeout = geo_settings.timeout();
        let mut builder = Self::builder(Arc::new(config))
            .settings(settings)
            .store(store)
            .geo_timeout(geo_timeout);
        if geo_settings.enabled {
            builder = builder.geo(Arc::new(IpApiLookup::new(geo_settings.url, geo_timeout)?));
        }
        builder.build()
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// Measure the network, unless a fresh snapshot is already stored
    pub async fn run_latency_test(&self, network_id: &str) -> Result<RunOutcome> {
        self.run(network_id, false).await
    }

    /// Measure the network even if the stored snapshot is still fresh
    pub async fn refresh(&self, network_id: &str) -> Result<RunOutcome> {
        self.run(network_id, true).await
    }

    /// Stored snapshot for the network, if still fresh
    pub async fn get_snapshot(&self, network_id: &str) -> Option<Snapshot> {
        self.cache.load(network_id).await
    }

    /// Live records of the run in flight for the network
    pub fn progress(&self, network_id: &str) -> Option<Vec<ProviderRecord>> {
        self.flights.progress(network_id)
    }

    pub fn is_running(&self, network_id: &str) -> bool {
        self.flights.is_running(network_id)
    }

    /// Whether the network has produced at least one result
    pub fn has_results(&self, network_id: &str) -> bool {
        self.has_results.read().unwrap_or_else(PoisonError::into_inner).contains(network_id)
    }

    /// Observer location from the most recent run
    pub fn geo_info(&self) -> Option<GeoInfo> {
        self.geo_info.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Receive run progress and passive merge events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.bus.subscribe()
    }

    /// Fold a passive latency report into the network's stored snapshot.
    ///
    /// Returns the new snapshot, or `None` when no entry carried a usable
    /// latency.
    pub async fn apply_passive(
        &self,
        network_id: &str,
        updates: &PassiveUpdates,
    ) -> Result<Option<Snapshot>> {
        let _write = self.write_locks.lock(network_id).await;

        let existing = self.cache.load_any(network_id).await.map(|s| s.results).unwrap_or_default();
        let (records, changed) = reconcile(existing, updates, &self.aggregator);
        if !changed || records.is_empty() {
            debug!(network = network_id, "Passive update carried no usable latency");
            return Ok(None);
        }

        let snapshot = Snapshot::new(records);
        self.cache.save(network_id, &snapshot).await?;
        self.mark_has_results(network_id);

        debug!(network = network_id, providers = snapshot.results.len(), "Merged passive latency");
        self.bus.publish(EngineEvent::PassiveMerged {
            network: network_id.to_string(),
            snapshot: snapshot.clone(),
        });

        Ok(Some(snapshot))
    }

    async fn run(&self, network_id: &str, force: bool) -> Result<RunOutcome> {
        let Some(endpoints) = self.networks.endpoints(network_id) else {
            debug!(network = network_id, "Network is not configured, skipping run");
            return Ok(RunOutcome::UnknownNetwork);
        };

        let Some(flight) = self.flights.try_begin(network_id) else {
            debug!(network = network_id, "Latency test already in progress");
            return Ok(RunOutcome::InProgress);
        };

        if !force && let Some(snapshot) = self.cache.load(network_id).await {
            info!(network = network_id, "Serving cached latency snapshot");
            if !snapshot.is_empty() {
                self.mark_has_results(network_id);
            }
            return Ok(RunOutcome::Cached(snapshot));
        }

        let loading: Vec<ProviderRecord> = endpoints.iter().map(ProviderRecord::loading).collect();
        flight.set_progress(loading.clone());
        self.bus.publish(EngineEvent::RunStarted {
            network: network_id.to_string(),
            records: loading,
        });
        info!(network = network_id, providers = endpoints.len(), "Starting latency test");

        let (geo_info, unsaved) = tokio::join!(
            geo::resolve(self.geo.as_deref(), self.geo_timeout),
            self.probe_all(network_id, &endpoints, &flight),
        );

        *self.geo_info.write().unwrap_or_else(PoisonError::into_inner) = Some(geo_info.clone());
        self.bus.publish(EngineEvent::GeoResolved(geo_info));

        let snapshot = self.finish_run(network_id, &endpoints, unsaved).await;
        info!(network = network_id, "Latency test complete");

        self.bus.publish(EngineEvent::RunCompleted {
            network: network_id.to_string(),
            snapshot: snapshot.clone(),
        });

        Ok(RunOutcome::Measured(snapshot))
    }

    /// Probe each endpoint in order, pausing between consecutive probes.
    ///
    /// Each record is stored as soon as it is measured. Returns the records
    /// whose write failed.
    async fn probe_all(
        &self,
        network_id: &str,
        endpoints: &[Endpoint],
        flight: &FlightGuard,
    ) -> Vec<ProviderRecord> {
        let mut unsaved = Vec::new();

        for (index, endpoint) in endpoints.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.settings.inter_probe_delay()).await;
            }

            let outcome = self.sampler.probe(endpoint).await;

            let mut record = ProviderRecord::loading(endpoint);
            self.aggregator.ingest(&mut record, &outcome);

            info!(
                network = network_id,
                provider = %endpoint.provider,
                status = %record.status(),
                latency_ms = ?record.latency(),
                "Probed endpoint"
            );

            flight.update(index, record.clone());
            self.bus.publish(EngineEvent::ProviderMeasured {
                network: network_id.to_string(),
                record: record.clone(),
            });

            if !self.store_measured(network_id, endpoints, &record).await {
                unsaved.push(record);
            }
        }

        unsaved
    }

    /// Write one freshly probed record into the stored snapshot.
    ///
    /// The snapshot keeps its previous timestamp (or the epoch when there is
    /// none), so a half-finished run is never served as fresh.
    async fn store_measured(
        &self,
        network_id: &str,
        endpoints: &[Endpoint],
        record: &ProviderRecord,
    ) -> bool {
        let _write = self.write_locks.lock(network_id).await;

        let previous = self.cache.load_any(network_id).await;
        let timestamp = previous.as_ref().map_or(0, |s| s.timestamp);
        let mut records = previous.map(|s| s.results).unwrap_or_default();
        upsert(&mut records, record.clone());

        let snapshot = Snapshot::at(arrange(records, endpoints), timestamp);
        match self.cache.save(network_id, &snapshot).await {
            Ok(()) => true,
            Err(e) => {
                warn!(network = network_id, provider = %record.provider(), "Failed to store probe result: {}", e);
                false
            }
        }
    }

    /// Stamp the stored snapshot as the run's result.
    ///
    /// Passive samples merged while the run was in flight stay in place, as do
    /// providers only the passive source knows.
    async fn finish_run(
        &self,
        network_id: &str,
        endpoints: &[Endpoint],
        unsaved: Vec<ProviderRecord>,
    ) -> Snapshot {
        let _write = self.write_locks.lock(network_id).await;

        let mut records = self.cache.load_any(network_id).await.map(|s| s.results).unwrap_or_default();
        for record in unsaved {
            upsert(&mut records, record);
        }

        let snapshot = Snapshot::new(arrange(records, endpoints));
        if let Err(e) = self.cache.save(network_id, &snapshot).await {
            error!(network = network_id, "Failed to store latency snapshot: {}", e);
        }
        if !snapshot.is_empty() {
            self.mark_has_results(network_id);
        }

        snapshot
    }

    fn mark_has_results(&self, network_id: &str) {
        self.has_results
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(network_id.to_string());
    }
}

/// Replace the record for the same provider, or append it
fn upsert(records: &mut Vec<ProviderRecord>, record: ProviderRecord) {
    match records.iter_mut().find(|r| r.provider() == record.provider()) {
        Some(slot) => *slot = record,
        None => records.push(record),
    }
}

/// Configured providers first in endpoint order, then the rest as they were
fn arrange(mut records: Vec<ProviderRecord>, endpoints: &[Endpoint]) -> Vec<ProviderRecord> {
    records.sort_by_key(|r| {
        endpoints.iter().position(|e| e.provider == r.provider()).unwrap_or(usize::MAX)
    });
    records
}
