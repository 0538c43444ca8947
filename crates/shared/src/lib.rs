//! Satchel Protocol - wire types shared by the backend and the player client
//!
//! This crate contains:
//! - Inbound message kinds (`ServerMessage`) and their dispatch key (`MessageKind`)
//! - Outbound commands (`ClientMessage`)
//! - Envelope encoding (session token attachment) and frame parsing
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - Only serde, serde_json and thiserror
//! 2. **No business logic** - Pure data types and serialization
//! 3. **Closed unions** - every kind has its own field shape; unknown kinds
//!    become `Unknown` instead of failing

pub mod envelope;
pub mod messages;

pub use envelope::{
    encode_command, parse_server_message, parse_server_value, ProtocolError, TOKEN_FIELD,
};
pub use messages::{
    ClientMessage, CreateSessionData, GameInfoPayload, GoldUpdate, InventoryUpdate, ItemRemoval,
    JoinSessionData, LootCounts, MessageKind, RegisterAction, ServerMessage,
};
