//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chainping::probe::{HttpClient, HttpReply, TransportError};
use chainping::store::{KeyValueStore, MemoryStore};
use chainping::{Config, LatencyEngine, NetworkConfig, ProbeSettings};
use serde_json::{Value, json};

/// How a scripted endpoint answers
#[derive(Debug, Clone)]
pub enum Script {
    /// Reply with a block number after the given delay
    Reply(Duration),
    /// Reply with the given HTTP status after the given delay
    Status(u16, Duration),
    /// Never answer
    Hang,
}

/// HTTP client that answers from a per-URL script and counts calls
#[derive(Default)]
pub struct ScriptedClient {
    scripts: Mutex<HashMap<String, Script>>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, url: &str, script: Script) -> Self {
        self.scripts.lock().unwrap().insert(url.to_string(), script);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpClient for ScriptedClient {
    async fn post_json(
        &self,
        url: &str,
        _body: &Value,
        _timeout: Duration,
    ) -> Result<HttpReply, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().unwrap().get(url).cloned();

        match script {
            Some(Script::Reply(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(HttpReply::json(200, json!({ "jsonrpc": "2.0", "id": 1, "result": "0x10" })))
            }
            Some(Script::Status(status, delay)) => {
                tokio::time::sleep(delay).await;
                Ok(HttpReply::json(status, json!({})))
            }
            Some(Script::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            None => Err(TransportError::Connect(format!("no route to {url}"))),
        }
    }
}

pub const A_URL: &str = "https://a.example/rpc";
pub const B_URL: &str = "https://b.example/rpc";

/// Config with a single "eth" network of providers A and B
pub fn two_provider_config() -> Config {
    Config { networks: Vec::new(), ..Config::default() }
        .with_network(NetworkConfig::new("eth").endpoint("A", A_URL).endpoint("B", B_URL))
}

pub fn settings() -> ProbeSettings {
    ProbeSettings { timeout_ms: 5_000, ..ProbeSettings::default() }
}

pub fn engine(client: Arc<ScriptedClient>, store: Arc<dyn KeyValueStore>) -> Arc<LatencyEngine> {
    let engine = LatencyEngine::builder(Arc::new(two_provider_config()))
        .settings(settings())
        .client(client)
        .store(store)
        .build()
        .unwrap();
    Arc::new(engine)
}

pub fn memory_store() -> Arc<dyn KeyValueStore> {
    Arc::new(MemoryStore::new())
}
