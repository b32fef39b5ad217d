use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Transport-level failure, kept apart from HTTP error statuses
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

/// Status and decoded body of an HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,

    /// Parsed JSON, or the reason the body could not be decoded
    pub body: Result<Value, String>,
}

impl HttpReply {
    pub fn json(status: u16, body: Value) -> Self {
        Self { status, body: Ok(body) }
    }
}

/// Outbound HTTP capability used by the sampler
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// POST `body` as JSON to `url`, giving up after `timeout`
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<HttpReply, TransportError>;
}

/// reqwest-backed HTTP client
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("chainping/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<HttpReply, TransportError> {
        let response = self.client.post(url).timeout(timeout).json(body).send().await?;
        let status = response.status().as_u16();

        let body = match response.text().await {
            Ok(text) => serde_json::from_str(&text).map_err(|e| e.to_string()),
            Err(e) if e.is_timeout() => return Err(TransportError::Timeout),
            Err(e) => Err(e.to_string()),
        };

        Ok(HttpReply { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    #[tokio::test]
    async fn test_post_json_returns_status_and_body() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST).path("/rpc").json_body(json!({ "id": 1 }));
            then.status(200).json_body(json!({ "jsonrpc": "2.0", "id": 1, "result": "0x10" }));
        });

        let client = ReqwestClient::new().unwrap();
        let reply = client
            .post_json(&server.url("/rpc"), &json!({ "id": 1 }), Duration::from_secs(2))
            .await
            .unwrap();

        mock.assert();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body.unwrap()["result"], "0x10");
    }

    #[tokio::test]
    async fn test_post_json_keeps_error_status() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/rpc");
            then.status(429).body("slow down");
        });

        let client = ReqwestClient::new().unwrap();
        let reply = client
            .post_json(&server.url("/rpc"), &json!({}), Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(reply.status, 429);
        assert!(reply.body.is_err());
    }

    #[tokio::test]
    async fn test_post_json_timeout() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/slow");
            then.status(200).delay(Duration::from_millis(500)).json_body(json!({}));
        });

        let client = ReqwestClient::new().unwrap();
        let result = client
            .post_json(&server.url("/slow"), &json!({}), Duration::from_millis(50))
            .await;

        assert_eq!(result, Err(TransportError::Timeout));
    }

    #[tokio::test]
    async fn test_post_json_connect_failure() {
        let client = ReqwestClient::new().unwrap();
        let result = client
            .post_json("http://127.0.0.1:1/", &json!({}), Duration::from_secs(2))
            .await;

        assert!(matches!(result, Err(TransportError::Connect(_))));
    }
}
