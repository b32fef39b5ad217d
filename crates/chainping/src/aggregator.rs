//! Rolling per-provider latency history.
//!
//! The aggregator is a reducer: a provider record is the fold of its ordered
//! events, so replaying the same events always yields the same record.

use crate::DEFAULT_HISTORY_CAPACITY;
use crate::types::{Endpoint, ProbeOutcome, ProviderRecord, ProviderStatus};

/// An update to a single provider record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordEvent {
    /// Outcome of one of our own probes
    Probed(ProbeOutcome),
    /// Latency observed by the passive source
    Sample(u64),
}

/// Applies samples to provider records with a bounded history
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    capacity: usize,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl Aggregator {
    /// Create an aggregator keeping at most `capacity` samples per provider
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1) }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fold a probe outcome into the record.
    ///
    /// A failure leaves the entry with no samples and the error attached.
    pub fn ingest(&self, record: &mut ProviderRecord, outcome: &ProbeOutcome) {
        match outcome {
            ProbeOutcome::Success { latency_ms } => self.push_sample(record, *latency_ms),
            ProbeOutcome::Failure { kind, message } => {
                record.samples.clear();
                record.latency = None;
                record.median_latency = None;
                record.status = ProviderStatus::Error;
                record.error_type = Some(*kind);
                record.error_message = Some(message.clone());
            }
        }
    }

    /// Append a sample, evicting the oldest one once the history is full
    pub fn push_sample(&self, record: &mut ProviderRecord, sample: u64) {
        record.samples.push_back(sample);
        while record.samples.len() > self.capacity {
            record.samples.pop_front();
        }

        record.latency = Some(sample);
        record.median_latency = median(&record.samples);
        record.status = ProviderStatus::Success;
        record.error_type = None;
        record.error_message = None;
    }

    pub fn apply(&self, record: &mut ProviderRecord, event: &RecordEvent) {
        match event {
            RecordEvent::Probed(outcome) => self.ingest(record, outcome),
            RecordEvent::Sample(sample) => self.push_sample(record, *sample),
        }
    }

    /// Rebuild a record from scratch out of its event stream
    pub fn replay<'a>(
        &self,
        endpoint: &Endpoint,
        events: impl IntoIterator<Item = &'a RecordEvent>,
    ) -> ProviderRecord {
        let mut record = ProviderRecord::loading(endpoint);
        for event in events {
            self.apply(&mut record, event);
        }
        record
    }

    /// Re-establish record invariants after loading from storage
    pub fn normalize(&self, record: &mut ProviderRecord) {
        while record.samples.len() > self.capacity {
            record.samples.pop_front();
        }
        record.median_latency = median(&record.samples);
        if let Some(last) = record.samples.back() {
            record.latency = Some(*last);
        }
    }
}

/// P50 of the samples; the mean of the two middle values for even counts
pub fn median<'a>(samples: impl IntoIterator<Item = &'a u64>) -> Option<f64> {
    let mut sorted: Vec<u64> = samples.into_iter().copied().collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_unstable();

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0)
    } else {
        Some(sorted[mid] as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;

    fn endpoint() -> Endpoint {
        Endpoint::new("Alchemy", "https://eth.example")
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[7]), Some(7.0));
        assert_eq!(median(&[1, 3]), Some(2.0));
        assert_eq!(median(&[130, 80, 120]), Some(120.0));
        assert_eq!(median(&[4, 1, 3, 2]), Some(2.5));
    }

    #[test]
    fn test_history_is_bounded_fifo() {
        let aggregator = Aggregator::default();
        let mut record = ProviderRecord::loading(&endpoint());

        for sample in 1..=11 {
            aggregator.push_sample(&mut record, sample);
        }

        assert_eq!(record.samples().len(), 10);
        assert_eq!(record.samples().front(), Some(&2));
        assert_eq!(record.samples().back(), Some(&11));
        assert_eq!(record.latency(), Some(11));
        assert_eq!(record.median_latency(), Some(6.5));
    }

    #[test]
    fn test_failure_clears_history() {
        let aggregator = Aggregator::default();
        let mut record = ProviderRecord::loading(&endpoint());
        aggregator.push_sample(&mut record, 100);

        aggregator.ingest(&mut record, &ProbeOutcome::failure(ErrorKind::RateLimit, "Rate limit exceeded"));

        assert_eq!(record.status(), ProviderStatus::Error);
        assert!(record.samples().is_empty());
        assert_eq!(record.median_latency(), None);
        assert_eq!(record.latency(), None);
        assert_eq!(record.error_type(), Some(ErrorKind::RateLimit));
        assert_eq!(record.error_message(), Some("Rate limit exceeded"));
    }

    #[test]
    fn test_success_after_failure_clears_error() {
        let aggregator = Aggregator::default();
        let mut record = ProviderRecord::loading(&endpoint());
        aggregator.ingest(&mut record, &ProbeOutcome::failure(ErrorKind::Timeout, "Connection timed out"));
        aggregator.push_sample(&mut record, 55);

        assert_eq!(record.status(), ProviderStatus::Success);
        assert_eq!(record.error_type(), None);
        assert_eq!(record.error_message(), None);
        assert_eq!(record.median_latency(), Some(55.0));
    }

    #[test]
    fn test_replay_is_deterministic() {
        let aggregator = Aggregator::new(3);
        let events = vec![
            RecordEvent::Probed(ProbeOutcome::Success { latency_ms: 90 }),
            RecordEvent::Sample(40),
            RecordEvent::Sample(70),
            RecordEvent::Sample(10),
        ];

        let first = aggregator.replay(&endpoint(), &events);
        let second = aggregator.replay(&endpoint(), &events);

        assert_eq!(first, second);
        assert_eq!(first.samples().iter().copied().collect::<Vec<_>>(), vec![40, 70, 10]);
        assert_eq!(first.median_latency(), Some(40.0));
    }

    #[test]
    fn test_normalize_recomputes_median() {
        let aggregator = Aggregator::new(2);
        let mut record = ProviderRecord::loading(&endpoint());
        record.samples.extend([5, 10, 30]);
        record.median_latency = Some(999.0);

        aggregator.normalize(&mut record);

        assert_eq!(record.samples().len(), 2);
        assert_eq!(record.median_latency(), Some(20.0));
        assert_eq!(record.latency(), Some(30));
    }
}
