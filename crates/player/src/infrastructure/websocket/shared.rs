//! Shared constants and frame parsing for the stream client.
//!
//! Runtime-agnostic (no tokio) so the connection core stays testable on its own.

use std::time::Duration;

use satchel_shared::{parse_server_message as parse_wire, ProtocolError, ServerMessage};
use url::Url;

// Reconnection policy
pub const MAX_RETRY_ATTEMPTS: u32 = 30;
pub const RETRY_DELAY: Duration = Duration::from_secs(5);
/// Longest wait for one stream open before it counts as failed
pub const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Parsed frame with the resync marker lifted out; it belongs to the
/// connection layer and is never dispatched to handlers.
#[derive(Debug)]
pub enum ParsedServerMessage {
    SyncToken(String),
    Other(Box<ServerMessage>),
}

pub fn parse_server_message(text: &str) -> Result<ParsedServerMessage, ProtocolError> {
    Ok(lift(parse_wire(text)?))
}

pub fn lift(message: ServerMessage) -> ParsedServerMessage {
    match message {
        ServerMessage::SyncToken { sync_token } => ParsedServerMessage::SyncToken(sync_token),
        other => ParsedServerMessage::Other(Box::new(other)),
    }
}

/// Stream address for a registration token: `<backend>/register/<token>`
/// with the http(s) scheme mapped to ws(s).
pub fn stream_address(backend_url: &Url, registration_token: &str) -> Option<String> {
    let mut url = backend_url.clone();
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme).ok()?;
    url.path_segments_mut()
        .ok()?
        .pop_if_empty()
        .push("register")
        .push(registration_token);
    Some(url.to_string())
}

/// Action endpoint address: `<backend>/action`.
pub fn action_address(backend_url: &Url) -> Option<Url> {
    let mut url = backend_url.clone();
    url.path_segments_mut()
        .ok()?
        .pop_if_empty()
        .push("action");
    Some(url)
}
