//! Infrastructure: the stream and action transports, the connection task
//! and the message plumbing around it.

pub mod http_client;
pub mod messaging;
pub mod websocket;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use messaging::{CommandBus, ConnectionState, SessionEvent};
