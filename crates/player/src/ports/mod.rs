//! Ports layer - contracts between the client core and its transports.

pub mod outbound;
