//! Satchel Player crate.
//!
//! The session client: stream connection with reconnects, command posting,
//! message dispatch, the replicated match state and the services the UI
//! drives.

pub mod application;
pub mod config;
pub mod infrastructure;
pub mod ports;
pub mod state;
