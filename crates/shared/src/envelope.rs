//! JSON envelope handling for both directions.
//!
//! Outbound commands are serialized and stamped with the session token once
//! it is known. Inbound text is parsed into a [`ServerMessage`]; anything
//! that fails to parse is reported as a [`ProtocolError`] for the caller to
//! log and drop.

use serde_json::Value;
use thiserror::Error;

use crate::messages::{ClientMessage, ServerMessage};

/// Key under which the session token travels in outbound envelopes.
pub const TOKEN_FIELD: &str = "token";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Envelope is not a JSON object")]
    NotAnObject,
}

/// Serialize a command, attaching `token` when one is held.
pub fn encode_command(message: &ClientMessage, token: Option<&str>) -> Result<Value, ProtocolError> {
    let mut value = serde_json::to_value(message)?;
    let object = value.as_object_mut().ok_or(ProtocolError::NotAnObject)?;
    if let Some(token) = token {
        object.insert(TOKEN_FIELD.to_string(), Value::String(token.to_string()));
    }
    Ok(value)
}

/// Parse one inbound text frame.
pub fn parse_server_message(text: &str) -> Result<ServerMessage, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// Parse an already-decoded reply body.
pub fn parse_server_value(value: Value) -> Result<ServerMessage, ProtocolError> {
    if !value.is_object() {
        return Err(ProtocolError::NotAnObject);
    }
    Ok(serde_json::from_value(value)?)
}
