//! Folding passive latency reports into existing provider records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aggregator::Aggregator;
use crate::types::{Endpoint, ProviderRecord};

/// One provider's entry in a passive latency report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassiveSample {
    #[serde(default)]
    pub latency: Option<f64>,
    #[serde(default)]
    pub endpoint: String,
}

impl PassiveSample {
    pub fn new(latency: f64, endpoint: impl Into<String>) -> Self {
        Self { latency: Some(latency), endpoint: endpoint.into() }
    }

    /// Usable latency in whole milliseconds; anything that rounds to zero or
    /// less is noise
    pub fn sample(&self) -> Option<u64> {
        self.latency
            .filter(|l| l.is_finite())
            .map(f64::round)
            .filter(|l| *l > 0.0)
            .map(|l| l as u64)
    }
}

/// Passive report keyed by provider name
pub type PassiveUpdates = BTreeMap<String, PassiveSample>;

/// Decode the JSON object written by the passive source
pub fn parse_passive(raw: &str) -> Result<PassiveUpdates, serde_json::Error> {
    serde_json::from_str(raw)
}

/// Apply passive updates to `records`.
///
/// Known providers get the sample appended to their history; unknown
/// providers are appended as new single-sample records. Existing order is
/// kept. Returns the records and whether anything changed.
pub fn reconcile(
    mut records: Vec<ProviderRecord>,
    updates: &PassiveUpdates,
    aggregator: &Aggregator,
) -> (Vec<ProviderRecord>, bool) {
    let mut changed = false;

    for (provider, update) in updates {
        let Some(sample) = update.sample() else {
            continue;
        };

        match records.iter_mut().find(|r| r.provider() == provider) {
            Some(record) => aggregator.push_sample(record, sample),
            None => {
                let mut record = ProviderRecord::loading(&Endpoint::new(provider, &update.endpoint));
                aggregator.push_sample(&mut record, sample);
                records.push(record);
            }
        }
        changed = true;
    }

    (records, changed)
}
