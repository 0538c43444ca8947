//! Persistent stream and connection lifecycle.
//!
//! - `core`: runtime-free connection state machine
//! - `manager`: the tokio task driving the machine and owning session state
//! - `bridge`: `create_connection`, wiring the manager to its buses
//! - `client`: tokio-tungstenite stream channel
//! - `shared`: retry constants, frame parsing and backend addressing

mod bridge;
mod client;
mod core;
mod manager;
mod shared;

pub use bridge::{create_connection, Connection};
pub use client::WebSocketChannel;
pub use self::core::{ConnectionAction, ConnectionMachine, RetryPolicy};
pub use manager::{ConnectionManager, ManagerSettings};
pub use shared::{action_address, stream_address, MAX_RETRY_ATTEMPTS, RETRY_DELAY};
