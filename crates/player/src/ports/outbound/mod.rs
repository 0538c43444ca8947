//! Outbound ports - Interfaces for external services
//!
//! These ports define the contracts that infrastructure adapters must implement,
//! so the connection manager can be driven by real sockets or by test doubles.

pub mod transport_port;

pub use transport_port::{ActionEndpoint, TransportChannel, TransportError, TransportEvent};

#[cfg(any(test, feature = "testing"))]
pub use transport_port::{MockActionEndpoint, MockTransportChannel};
