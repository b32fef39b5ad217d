use anyhow::Result;
use chainping::{GeoInfo, ProviderRecord, Snapshot};
use serde::Serialize;

/// JSON document printed for a snapshot
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report<'a> {
    network: &'a str,
    source: &'a str,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    geo: Option<GeoInfo>,
    results: &'a [ProviderRecord],
}

impl<'a> Report<'a> {
    pub fn new(network: &'a str, source: &'a str, snapshot: &'a Snapshot, geo: Option<GeoInfo>) -> Self {
        Self { network, source, timestamp: snapshot.timestamp, geo, results: &snapshot.results }
    }

    pub fn print(&self) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(self)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainping::Endpoint;

    #[test]
    fn test_report_shape() {
        let snapshot = Snapshot::at(vec![ProviderRecord::loading(&Endpoint::new("A", "https://a.example"))], 42);
        let value = serde_json::to_value(Report::new("eth", "cached", &snapshot, None)).unwrap();

        assert_eq!(value["network"], "eth");
        assert_eq!(value["timestamp"], 42);
        assert_eq!(value["results"][0]["provider"], "A");
        assert_eq!(value["results"][0]["status"], "loading");
        assert!(value.get("geo").is_none());
    }
}
