//! HTTP action endpoint: one POST per command, the JSON body is the reply.
//!
//! Rejected commands come back as 4xx with an `error` envelope; that envelope
//! is a reply like any other and goes on to the dispatcher.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use url::Url;

use crate::ports::outbound::{ActionEndpoint, TransportError};

/// Default request timeout for posted commands.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct HttpActionEndpoint {
    client: Client,
    action_url: Url,
}

impl HttpActionEndpoint {
    pub fn new(action_url: Url) -> Self {
        Self::with_timeout(action_url, DEFAULT_ACTION_TIMEOUT)
    }

    pub fn with_timeout(action_url: Url, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self::with_client(action_url, client)
    }

    pub fn with_client(action_url: Url, client: Client) -> Self {
        Self { client, action_url }
    }

    pub fn action_url(&self) -> &Url {
        &self.action_url
    }
}

#[async_trait]
impl ActionEndpoint for HttpActionEndpoint {
    async fn post(&self, envelope: Value) -> Result<Value, TransportError> {
        let response = self
            .client
            .post(self.action_url.clone())
            .json(&envelope)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        if status.is_success() {
            return parse_reply_body(&body);
        }
        if status.is_client_error() {
            if let Ok(reply) = serde_json::from_slice::<Value>(&body) {
                tracing::debug!(%status, "Command rejected by backend");
                return Ok(reply);
            }
        }

        Err(TransportError::Request(format!(
            "{}: {}",
            status,
            String::from_utf8_lossy(&body)
        )))
    }
}

/// Commands without a reply answer with an empty body.
fn parse_reply_body(body: &[u8]) -> Result<Value, TransportError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| TransportError::InvalidReply(e.to_string()))
}
