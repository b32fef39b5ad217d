use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A provider and the RPC address it is probed at
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Display name of the operator (e.g., "Alchemy", "Infura")
    pub provider: String,

    /// RPC URL the probe is posted to
    pub url: String,
}

impl Endpoint {
    pub fn new(provider: impl Into<String>, url: impl Into<String>) -> Self {
        Self { provider: provider.into(), url: url.into() }
    }
}

/// Why a probe failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    RateLimit,
    Connection,
    RpcError,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::RateLimit => write!(f, "rate_limit"),
            ErrorKind::Connection => write!(f, "connection"),
            ErrorKind::RpcError => write!(f, "rpc_error"),
            ErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Status of a provider entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Loading,
    Success,
    Error,
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderStatus::Loading => write!(f, "loading"),
            ProviderStatus::Success => write!(f, "success"),
            ProviderStatus::Error => write!(f, "error"),
        }
    }
}

/// Result of a single probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success { latency_ms: u64 },
    Failure { kind: ErrorKind, message: String },
}

impl ProbeOutcome {
    pub fn success(latency: Duration) -> Self {
        ProbeOutcome::Success { latency_ms: round_millis(latency) }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        ProbeOutcome::Failure { kind, message: message.into() }
    }

    pub fn latency_ms(&self) -> Option<u64> {
        match self {
            ProbeOutcome::Success { latency_ms } => Some(*latency_ms),
            ProbeOutcome::Failure { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ProbeOutcome::Success { .. } => None,
            ProbeOutcome::Failure { kind, .. } => Some(*kind),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success { .. })
    }
}

/// Round a duration to the nearest whole millisecond
pub fn round_millis(duration: Duration) -> u64 {
    (duration.as_secs_f64() * 1000.0).round() as u64
}

/// Latency history and current state for one provider.
///
/// Only the aggregator mutates a record, which keeps `median_latency` in step
/// with `samples` and `latency` equal to the newest sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRecord {
    pub(crate) provider: String,
    pub(crate) endpoint: String,
    pub(crate) status: ProviderStatus,
    #[serde(default)]
    pub(crate) latency: Option<u64>,
    #[serde(default)]
    pub(crate) median_latency: Option<f64>,
    #[serde(default)]
    pub(crate) samples: VecDeque<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) error_type: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) error_message: Option<String>,
}

impl ProviderRecord {
    /// Create an empty record waiting for its first probe
    pub fn loading(endpoint: &Endpoint) -> Self {
        Self {
            provider: endpoint.provider.clone(),
            endpoint: endpoint.url.clone(),
            status: ProviderStatus::Loading,
            latency: None,
            median_latency: None,
            samples: VecDeque::new(),
            error_type: None,
            error_message: None,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn status(&self) -> ProviderStatus {
        self.status
    }

    /// Most recently recorded sample
    pub fn latency(&self) -> Option<u64> {
        self.latency
    }

    pub fn median_latency(&self) -> Option<f64> {
        self.median_latency
    }

    /// Sample history, oldest first
    pub fn samples(&self) -> &VecDeque<u64> {
        &self.samples
    }

    pub fn error_type(&self) -> Option<ErrorKind> {
        self.error_type
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

/// Every provider record for one network at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub results: Vec<ProviderRecord>,

    /// Creation time in Unix epoch milliseconds
    pub timestamp: i64,
}

impl Snapshot {
    /// Create a snapshot stamped with the current time
    pub fn new(results: Vec<ProviderRecord>) -> Self {
        Self::at(results, chrono::Utc::now().timestamp_millis())
    }

    pub fn at(results: Vec<ProviderRecord>, timestamp: i64) -> Self {
        Self { results, timestamp }
    }

    /// A snapshot is fresh while strictly younger than the TTL
    pub fn is_fresh_at(&self, now_ms: i64, ttl: Duration) -> bool {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.timestamp) < ttl_ms
    }

    pub fn record(&self, provider: &str) -> Option<&ProviderRecord> {
        self.results.iter().find(|r| r.provider == provider)
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Where the observer appears to be, as reported by a geo lookup service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub location: String,
    pub asn: Option<String>,
    pub isp: Option<String>,
}

impl GeoInfo {
    pub fn unknown() -> Self {
        Self { location: "Unknown Location".to_string(), asn: None, isp: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_millis() {
        assert_eq!(round_millis(Duration::from_micros(120_499)), 120);
        assert_eq!(round_millis(Duration::from_micros(120_500)), 121);
        assert_eq!(round_millis(Duration::ZERO), 0);
    }

    #[test]
    fn test_snapshot_freshness_boundary() {
        let ttl = Duration::from_secs(300);
        let now = 1_700_000_000_000;

        assert!(Snapshot::at(Vec::new(), now - 299_000).is_fresh_at(now, ttl));
        assert!(!Snapshot::at(Vec::new(), now - 300_000).is_fresh_at(now, ttl));
        assert!(!Snapshot::at(Vec::new(), now - 301_000).is_fresh_at(now, ttl));
    }

    #[test]
    fn test_record_wire_format() {
        let record = ProviderRecord::loading(&Endpoint::new("Alchemy", "https://eth.example"));
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["provider"], "Alchemy");
        assert_eq!(json["status"], "loading");
        assert!(json["medianLatency"].is_null());
        assert!(json.get("errorType").is_none());
    }

    #[test]
    fn test_outcome_accessors() {
        let ok = ProbeOutcome::success(Duration::from_millis(42));
        assert_eq!(ok.latency_ms(), Some(42));
        assert!(ok.error_kind().is_none());

        let failed = ProbeOutcome::failure(ErrorKind::Timeout, "Connection timed out");
        assert!(failed.latency_ms().is_none());
        assert_eq!(failed.error_kind(), Some(ErrorKind::Timeout));
    }
}
