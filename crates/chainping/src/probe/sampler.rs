use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

use super::client::{HttpClient, HttpReply, TransportError};
use crate::types::{Endpoint, ErrorKind, ProbeOutcome};

/// JSON-RPC request sent to every endpoint
pub fn probe_body() -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "eth_blockNumber",
        "params": [],
        "id": 1,
    })
}

/// Issues one timed probe per call
pub struct Sampler {
    client: Arc<dyn HttpClient>,
    timeout: Duration,
}

impl Sampler {
    pub fn new(client: Arc<dyn HttpClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Probe the endpoint once and classify the result
    pub async fn probe(&self, endpoint: &Endpoint) -> ProbeOutcome {
        let body = probe_body();
        let start = Instant::now();

        // The client is also handed the timeout, this is the hard ceiling
        let result = timeout(self.timeout, self.client.post_json(&endpoint.url, &body, self.timeout))
            .await
            .unwrap_or(Err(TransportError::Timeout));

        let outcome = classify(result, start.elapsed());

        match &outcome {
            ProbeOutcome::Success { latency_ms } => {
                debug!(provider = %endpoint.provider, latency_ms, "Probe succeeded");
            }
            ProbeOutcome::Failure { kind, message } => {
                warn!(provider = %endpoint.provider, error_kind = %kind, "Probe failed: {}", message);
            }
        }

        outcome
    }
}

/// Map a transport result onto a probe outcome, first matching rule wins
pub fn classify(result: Result<HttpReply, TransportError>, elapsed: Duration) -> ProbeOutcome {
    let reply = match result {
        Ok(reply) => reply,
        Err(TransportError::Timeout) => {
            return ProbeOutcome::failure(ErrorKind::Timeout, "Connection timed out");
        }
        Err(TransportError::Connect(_)) => {
            return ProbeOutcome::failure(ErrorKind::Connection, "Connection failed");
        }
        Err(TransportError::Other(message)) => {
            return ProbeOutcome::failure(ErrorKind::Unknown, message);
        }
    };

    match reply.status {
        429 => return ProbeOutcome::failure(ErrorKind::RateLimit, "Rate limit exceeded"),
        s if s >= 500 => return ProbeOutcome::failure(ErrorKind::RpcError, "Server error"),
        403 => return ProbeOutcome::failure(ErrorKind::Connection, "Access denied"),
        s if !(200..300).contains(&s) => {
            return ProbeOutcome::failure(ErrorKind::Unknown, format!("HTTP error: {s}"));
        }
        _ => {}
    }

    match reply.body {
        Err(message) => ProbeOutcome::failure(ErrorKind::Unknown, message),
        Ok(body) => match body.get("error").filter(|e| !e.is_null()) {
            Some(error) => {
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .filter(|m| !m.is_empty())
                    .unwrap_or("RPC error");
                ProbeOutcome::failure(ErrorKind::RpcError, message)
            }
            None => ProbeOutcome::success(elapsed),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    const ELAPSED: Duration = Duration::from_millis(120);

    fn status(code: u16) -> Result<HttpReply, TransportError> {
        Ok(HttpReply::json(code, json!({})))
    }

    #[test]
    fn test_classify_transport_errors() {
        let outcome = classify(Err(TransportError::Timeout), ELAPSED);
        assert_eq!(outcome, ProbeOutcome::failure(ErrorKind::Timeout, "Connection timed out"));

        let outcome = classify(Err(TransportError::Connect("refused".into())), ELAPSED);
        assert_eq!(outcome, ProbeOutcome::failure(ErrorKind::Connection, "Connection failed"));

        let outcome = classify(Err(TransportError::Other("builder error".into())), ELAPSED);
        assert_eq!(outcome, ProbeOutcome::failure(ErrorKind::Unknown, "builder error"));
    }

    #[test]
    fn test_classify_http_statuses() {
        assert_eq!(classify(status(429), ELAPSED).error_kind(), Some(ErrorKind::RateLimit));
        assert_eq!(classify(status(503), ELAPSED).error_kind(), Some(ErrorKind::RpcError));
        assert_eq!(classify(status(500), ELAPSED).error_kind(), Some(ErrorKind::RpcError));
        assert_eq!(
            classify(status(403), ELAPSED),
            ProbeOutcome::failure(ErrorKind::Connection, "Access denied")
        );
        assert_eq!(
            classify(status(404), ELAPSED),
            ProbeOutcome::failure(ErrorKind::Unknown, "HTTP error: 404")
        );
        assert_eq!(
            classify(status(301), ELAPSED),
            ProbeOutcome::failure(ErrorKind::Unknown, "HTTP error: 301")
        );
    }

    #[test]
    fn test_classify_rpc_error_body() {
        let reply = HttpReply::json(200, json!({ "error": { "message": "x" } }));
        assert_eq!(classify(Ok(reply), ELAPSED), ProbeOutcome::failure(ErrorKind::RpcError, "x"));

        let reply = HttpReply::json(200, json!({ "error": { "code": -32000 } }));
        assert_eq!(
            classify(Ok(reply), ELAPSED),
            ProbeOutcome::failure(ErrorKind::RpcError, "RPC error")
        );
    }

    #[test]
    fn test_classify_success() {
        let reply = HttpReply::json(200, json!({ "jsonrpc": "2.0", "id": 1, "result": "0x1b4" }));
        assert_eq!(classify(Ok(reply), ELAPSED), ProbeOutcome::Success { latency_ms: 120 });

        let reply = HttpReply::json(200, json!({ "result": "0x1", "error": null }));
        assert!(classify(Ok(reply), ELAPSED).is_success());
    }

    #[test]
    fn test_classify_undecodable_body() {
        let reply = HttpReply { status: 200, body: Err("expected value at line 1".into()) };
        assert_eq!(
            classify(Ok(reply), ELAPSED),
            ProbeOutcome::failure(ErrorKind::Unknown, "expected value at line 1")
        );
    }

    struct Stalled;

    #[async_trait]
    impl HttpClient for Stalled {
        async fn post_json(
            &self,
            _url: &str,
            _body: &Value,
            _timeout: Duration,
        ) -> Result<HttpReply, TransportError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(HttpReply::json(200, json!({ "result": "0x1" })))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_enforces_hard_timeout() {
        let sampler = Sampler::new(Arc::new(Stalled), Duration::from_millis(5_000));
        let endpoint = Endpoint::new("Slow", "https://slow.example");

        let started = Instant::now();
        let outcome = sampler.probe(&endpoint).await;

        assert_eq!(outcome.error_kind(), Some(ErrorKind::Timeout));
        assert!(started.elapsed() >= Duration::from_millis(5_000));
        assert!(started.elapsed() < Duration::from_secs(60));
    }
}
