//! Test-only infrastructure fakes.
//!
//! These implement the outbound transport ports so the connection manager and
//! the services can be driven without a real backend.

pub mod recording_endpoint;
pub mod scripted_transport;

pub use recording_endpoint::RecordingEndpoint;
pub use scripted_transport::{ScriptedTransport, TransportScript};
