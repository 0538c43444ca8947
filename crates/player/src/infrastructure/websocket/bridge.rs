//! Connection factory - wires a [`ConnectionManager`] to its buses.
//!
//! `create_connection` sets up:
//! - a CommandBus for commands, handler registration and lifecycle requests
//! - a watch channel carrying the current match state
//! - a broadcast channel carrying session events
//! - the background task running the manager
//!
//! One `Connection` serves one session. Construct it explicitly and hand it
//! to whatever needs it.

use std::sync::atomic::AtomicU8;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};

use super::manager::{ConnectionManager, ManagerSettings, Publishers};
use crate::infrastructure::messaging::{
    BusMessage, CommandBus, ConnectionHandle, ConnectionState, ConnectionStateObserver,
    SessionEvent,
};
use crate::ports::outbound::{ActionEndpoint, TransportChannel};
use crate::state::MatchState;

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 64;

/// Result of creating a connection.
///
/// - `command_bus`: send commands and register handlers
/// - `handle`: stop the connection task
/// - `state_observer`: observe connection state (for UI binding)
/// - `match_state`: observe the replicated match state
pub struct Connection {
    pub command_bus: CommandBus,
    pub handle: ConnectionHandle,
    pub state_observer: ConnectionStateObserver,
    pub match_state: watch::Receiver<Arc<MatchState>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Connection {
    /// A new receiver for session events published from now on.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<SessionEvent> {
        self.events.clone()
    }
}

/// Spawn the connection task on the current tokio runtime.
pub fn create_connection(
    settings: ManagerSettings,
    transport: Box<dyn TransportChannel>,
    endpoint: Arc<dyn ActionEndpoint>,
) -> Connection {
    // Create channels
    let (cmd_tx, cmd_rx) = mpsc::channel::<BusMessage>(COMMAND_BUFFER);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let (match_state_tx, match_state) = watch::channel(Arc::new(MatchState::default()));
    let (events, _) = broadcast::channel(EVENT_BUFFER);

    // Create shared state
    let state = Arc::new(AtomicU8::new(ConnectionState::Disconnected.to_u8()));

    let manager = ConnectionManager::new(
        settings,
        transport,
        endpoint,
        Publishers {
            state: Arc::clone(&state),
            match_state: match_state_tx,
            events: events.clone(),
        },
    );

    tokio::spawn(async move {
        manager.run(cmd_rx, shutdown_rx).await;
        tracing::debug!("Connection task finished");
    });

    Connection {
        command_bus: CommandBus::new(cmd_tx),
        handle: ConnectionHandle::new(Arc::clone(&state), shutdown_tx),
        state_observer: ConnectionStateObserver::new(state),
        match_state,
        events,
    }
}
