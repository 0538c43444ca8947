//! Connection lifecycle management.
//!
//! This module provides types for observing the connection lifecycle and
//! for shutting the connection task down.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;

/// Connection state for the game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not connected to the backend
    Disconnected,
    /// First connection attempt in progress
    Connecting,
    /// Stream is open and delivering frames
    Open,
    /// Connection lost, reconnect attempts in progress
    Retrying,
    /// Retry budget exhausted or backend unreachable; terminal
    Failed,
}

impl ConnectionState {
    /// Convert to u8 for atomic storage.
    pub fn to_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Open => 2,
            ConnectionState::Retrying => 3,
            ConnectionState::Failed => 4,
        }
    }

    /// Convert from u8 (atomic storage).
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Open,
            3 => ConnectionState::Retrying,
            4 => ConnectionState::Failed,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Open => write!(f, "Open"),
            ConnectionState::Retrying => write!(f, "Retrying"),
            ConnectionState::Failed => write!(f, "Failed"),
        }
    }
}

/// Reconnection progress, as shown by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetrySignal {
    /// Reconnect attempt `n` has been scheduled (1-based)
    Attempt(u32),
    /// The connection came back; progress indicators can be hidden
    Recovered,
}

impl RetrySignal {
    /// Integer form: the attempt number, or `-1` once recovered.
    pub fn as_count(self) -> i32 {
        match self {
            RetrySignal::Attempt(n) => i32::try_from(n).unwrap_or(i32::MAX),
            RetrySignal::Recovered => -1,
        }
    }
}

/// Handle to stop the connection task.
///
/// Dropping the handle does NOT stop the task. Call `shutdown()` explicitly.
pub struct ConnectionHandle {
    state: Arc<AtomicU8>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ConnectionHandle {
    pub fn new(state: Arc<AtomicU8>, shutdown_tx: oneshot::Sender<()>) -> Self {
        Self {
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Ask the connection task to close the transport and exit.
    ///
    /// Consumes the handle; a stopped task cannot be restarted.
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Observable connection state for UI binding.
#[derive(Clone)]
pub struct ConnectionStateObserver {
    state: Arc<AtomicU8>,
}

impl ConnectionStateObserver {
    pub fn new(state: Arc<AtomicU8>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }
}

/// Internal helper to publish connection state (used by the manager).
pub fn set_connection_state(state_ref: &AtomicU8, new_state: ConnectionState) {
    state_ref.store(new_state.to_u8(), Ordering::SeqCst);
}
