//! Notifications the connection task publishes to the UI.

use super::connection::RetrySignal;

/// Events broadcast to every UI subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The stream opened (first connect or after a retry)
    Connected,
    /// Reconnection progress
    Retrying(RetrySignal),
    /// The backend rejected a command; show as a transient toast
    ServerError(String),
    /// Informational message from the backend
    Notification(String),
    /// Retry budget exhausted; the user must rejoin the session
    SessionLost,
    /// The first connection attempt never opened
    BackendUnreachable,
}
