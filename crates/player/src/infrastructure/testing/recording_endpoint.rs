//! `ActionEndpoint` fake that records every envelope and answers from a
//! test-supplied responder.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::ports::outbound::{ActionEndpoint, TransportError};

type Responder = Box<dyn Fn(&Value) -> Result<Value, TransportError> + Send + Sync>;

#[derive(Clone)]
pub struct RecordingEndpoint {
    posted: Arc<Mutex<Vec<Value>>>,
    responder: Arc<Responder>,
}

impl RecordingEndpoint {
    /// Answers every command with `null` (no reply).
    pub fn silent() -> Self {
        Self::with_responder(|_| Ok(Value::Null))
    }

    pub fn with_responder(
        responder: impl Fn(&Value) -> Result<Value, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            posted: Arc::new(Mutex::new(Vec::new())),
            responder: Arc::new(Box::new(responder)),
        }
    }

    pub fn posted(&self) -> Vec<Value> {
        self.posted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The `type` field of every posted envelope, in order.
    pub fn posted_types(&self) -> Vec<String> {
        self.posted()
            .iter()
            .filter_map(|envelope| envelope.get("type").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }
}

#[async_trait::async_trait]
impl ActionEndpoint for RecordingEndpoint {
    async fn post(&self, envelope: Value) -> Result<Value, TransportError> {
        let reply = (self.responder)(&envelope);
        self.posted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(envelope);
        reply
    }
}
