//! Best-effort lookup of where the observer sits on the network.

use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::types::GeoInfo;

/// ip-api.com - free, no API key required, 45 requests/minute
pub const DEFAULT_GEO_URL: &str =
    "http://ip-api.com/json/?fields=status,message,country,regionName,city,as,isp";

/// Source of observer location information
#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup(&self) -> Result<GeoInfo>;
}

/// Response from ip-api.com geolocation service
#[derive(Debug, Deserialize)]
struct IpApiResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    city: String,
    #[serde(rename = "regionName", default)]
    region_name: String,
    #[serde(default)]
    country: String,
    #[serde(rename = "as", default)]
    asn: String,
    #[serde(default)]
    isp: String,
}

pub struct IpApiLookup {
    client: reqwest::Client,
    url: String,
}

impl IpApiLookup {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl GeoLookup for IpApiLookup {
    async fn lookup(&self) -> Result<GeoInfo> {
        let response = self.client.get(&self.url).send().await?.json::<IpApiResponse>().await?;

        if response.status != "success" {
            bail!("geo lookup rejected: {}", response.message);
        }

        Ok(GeoInfo {
            location: format_location(&[
                response.city.as_str(),
                response.region_name.as_str(),
                response.country.as_str(),
            ]),
            asn: non_empty(response.asn),
            isp: non_empty(response.isp),
        })
    }
}

/// Resolve the observer location, falling back to an unknown location.
///
/// `ceiling` bounds the whole lookup regardless of the lookup's own timeouts.
pub async fn resolve(lookup: Option<&dyn GeoLookup>, ceiling: Duration) -> GeoInfo {
    let Some(lookup) = lookup else {
        return GeoInfo::unknown();
    };

    match timeout(ceiling, lookup.lookup()).await {
        Ok(Ok(geo)) => {
            info!(location = %geo.location, asn = ?geo.asn, "Resolved observer location");
            geo
        }
        Ok(Err(e)) => {
            warn!("Failed to resolve observer location: {}", e);
            GeoInfo::unknown()
        }
        Err(_) => {
            warn!(timeout_ms = ceiling.as_millis() as u64, "Observer location lookup timed out");
            GeoInfo::unknown()
        }
    }
}

fn format_location(parts: &[&str]) -> String {
    let parts: Vec<&str> = parts.iter().copied().filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        return GeoInfo::unknown().location;
    }
    parts.join(", ")
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, MockServer};
    use serde_json::json;

    const CEILING: Duration = Duration::from_secs(2);

    #[test]
    fn test_format_location() {
        assert_eq!(format_location(&["Berlin", "Land Berlin", "Germany"]), "Berlin, Land Berlin, Germany");
        assert_eq!(format_location(&["", "", "Japan"]), "Japan");
        assert_eq!(format_location(&["", ""]), "Unknown Location");
    }

    #[tokio::test]
    async fn test_ip_api_lookup() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/json/");
            then.status(200).json_body(json!({
                "status": "success",
                "city": "Amsterdam",
                "regionName": "North Holland",
                "country": "Netherlands",
                "as": "AS1136 KPN B.V.",
                "isp": "KPN"
            }));
        });

        let lookup = IpApiLookup::new(server.url("/json/"), Duration::from_secs(2)).unwrap();
        let geo = lookup.lookup().await.unwrap();

        assert_eq!(geo.location, "Amsterdam, North Holland, Netherlands");
        assert_eq!(geo.asn.as_deref(), Some("AS1136 KPN B.V."));
        assert_eq!(geo.isp.as_deref(), Some("KPN"));
    }

    #[tokio::test]
    async fn test_failed_lookup_degrades_to_unknown() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/json/");
            then.status(200).json_body(json!({ "status": "fail", "message": "reserved range" }));
        });

        let lookup = IpApiLookup::new(server.url("/json/"), Duration::from_secs(2)).unwrap();
        assert!(lookup.lookup().await.is_err());
        assert_eq!(resolve(Some(&lookup as &dyn GeoLookup), CEILING).await, GeoInfo::unknown());
        assert_eq!(resolve(None, CEILING).await, GeoInfo::unknown());
    }

    struct Silent;

    #[async_trait]
    impl GeoLookup for Silent {
        async fn lookup(&self) -> Result<GeoInfo> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_lookup_is_cut_off() {
        let started = tokio::time::Instant::now();

        let geo = resolve(Some(&Silent as &dyn GeoLookup), CEILING).await;

        assert_eq!(geo, GeoInfo::unknown());
        assert!(started.elapsed() >= CEILING);
        assert!(started.elapsed() < CEILING * 2);
    }
}
