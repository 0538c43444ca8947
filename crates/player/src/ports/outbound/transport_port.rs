//! Transport Ports - the two physical channels to the backend
//!
//! `TransportChannel` owns the persistent push stream; `ActionEndpoint` is the
//! request-style endpoint that accepts one command and answers with one JSON
//! reply. Neither knows anything about message semantics.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Invalid reply: {0}")]
    InvalidReply(String),
}

/// Something read from the persistent channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One text frame
    Frame(String),
    /// The channel went away (peer close, error, or end of stream)
    Closed { reason: Option<String> },
}

/// Port for the persistent stream.
///
/// `open` resolves once the channel is usable; an `Err` means it never
/// opened. After a successful open, `next_event` yields frames until it
/// yields `Closed`.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait::async_trait]
pub trait TransportChannel: Send {
    async fn open(&mut self, address: &str) -> Result<(), TransportError>;

    async fn next_event(&mut self) -> TransportEvent;

    async fn close(&mut self);
}

/// Port for posting one command and receiving its correlated reply.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait::async_trait]
pub trait ActionEndpoint: Send + Sync {
    async fn post(&self, envelope: Value) -> Result<Value, TransportError>;
}
