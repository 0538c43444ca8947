//! Session service for managing the backend session
//!
//! This service handles:
//! - Creating and joining sessions (the register handshake)
//! - Choosing who this client plays as
//! - Exposing the replicated match state and session events to the UI
//! - Tearing the connection down

use std::sync::Arc;

use satchel_domain::PlayerId;
use satchel_shared::{ClientMessage, MessageKind, ServerMessage};
use tokio::sync::{broadcast, watch};

use crate::application::error::SessionError;
use crate::infrastructure::messaging::{
    CommandBus, ConnectionHandle, ConnectionState, ConnectionStateObserver, SessionEvent,
};
use crate::infrastructure::websocket::{create_connection, Connection, ManagerSettings};
use crate::ports::outbound::{ActionEndpoint, TransportChannel};
use crate::state::MatchState;

/// Cleanup identifier used for the "session lost" reaction.
pub const SESSION_CLEANUP: &str = "session.lost";

/// Session service for managing one backend session.
///
/// Owns the connection lifecycle and hands out the command bus and state
/// receivers the other services are built from.
pub struct SessionService {
    command_bus: CommandBus,
    state_observer: ConnectionStateObserver,
    match_state: watch::Receiver<Arc<MatchState>>,
    events: broadcast::Sender<SessionEvent>,
    // Consumed on shutdown
    handle: Option<ConnectionHandle>,
}

impl SessionService {
    /// Spawn a connection task and wrap it.
    pub fn new(
        settings: ManagerSettings,
        transport: Box<dyn TransportChannel>,
        endpoint: Arc<dyn ActionEndpoint>,
    ) -> Self {
        Self::from_connection(create_connection(settings, transport, endpoint))
    }

    pub fn from_connection(connection: Connection) -> Self {
        let events = connection.event_sender();
        let Connection {
            command_bus,
            handle,
            state_observer,
            match_state,
            ..
        } = connection;

        Self {
            command_bus,
            state_observer,
            match_state,
            events,
            handle: Some(handle),
        }
    }

    pub fn command_bus(&self) -> &CommandBus {
        &self.command_bus
    }

    /// A receiver that observes every new match state.
    pub fn match_state(&self) -> watch::Receiver<Arc<MatchState>> {
        self.match_state.clone()
    }

    pub fn snapshot(&self) -> Arc<MatchState> {
        Arc::clone(&self.match_state.borrow())
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.state_observer.state()
    }

    pub fn is_open(&self) -> bool {
        self.state_observer.is_open()
    }

    /// Join an existing session by its join code.
    ///
    /// On success the backend answers with a registration token and the
    /// stream is opened; the first snapshot follows once it registers.
    pub async fn join_session(&self, code: &str) -> Result<(), SessionError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(SessionError::InvalidInput("join code is empty"));
        }
        tracing::info!(code, "Joining session");
        self.register(ClientMessage::join_session(code)).await
    }

    /// Create a new session; the creator becomes its Dungeon Master.
    pub async fn create_session(
        &self,
        name: &str,
        description: &str,
        dm_pass: &str,
    ) -> Result<(), SessionError> {
        tracing::info!(name, "Creating session");
        self.register(ClientMessage::create_session(name, description, dm_pass))
            .await
    }

    async fn register(&self, command: ClientMessage) -> Result<(), SessionError> {
        match self.command_bus.request(command).await? {
            ServerMessage::Register {
                registration_token: Some(_),
                ..
            } => Ok(()),
            ServerMessage::Error { msg } => Err(SessionError::Rejected(msg)),
            other => Err(SessionError::UnexpectedReply {
                command: "register",
                kind: other.kind(),
            }),
        }
    }

    /// Play as `player_id` in the joined game.
    pub fn select_player(&self, player_id: PlayerId) -> Result<(), SessionError> {
        if player_id.is_dungeon_master() {
            return Err(SessionError::InvalidInput(
                "use select_dungeon_master to take the DM seat",
            ));
        }
        let game = self.snapshot();
        let game_info = game.current_game.as_ref().ok_or(SessionError::NoGame)?;
        if game_info.player(player_id).is_none() {
            return Err(SessionError::UnknownPlayer(player_id));
        }

        self.command_bus.send(ClientMessage::SelectPlayer {
            player_id,
            game_id: game_info.game.id,
            dm_pass: None,
        })?;
        Ok(())
    }

    /// Take the Dungeon Master seat; the backend checks the password.
    pub fn select_dungeon_master(&self, dm_pass: &str) -> Result<(), SessionError> {
        let game = self.snapshot();
        let game_info = game.current_game.as_ref().ok_or(SessionError::NoGame)?;

        self.command_bus.send(ClientMessage::SelectPlayer {
            player_id: PlayerId::DUNGEON_MASTER,
            game_id: game_info.game.id,
            dm_pass: Some(dm_pass.to_string()),
        })?;
        Ok(())
    }

    /// Ask for a fresh full snapshot.
    pub fn refresh(&self) -> Result<(), SessionError> {
        self.command_bus.send(ClientMessage::GetGameInfo)?;
        Ok(())
    }

    /// Run `callback` once if the session is lost for good (retries
    /// exhausted). Registering again under the same identifier is a no-op.
    pub fn on_session_lost(
        &self,
        callback: impl FnOnce() + Send + 'static,
    ) -> Result<(), SessionError> {
        self.command_bus.add_cleanup(SESSION_CLEANUP, callback)?;
        Ok(())
    }

    /// Wait until a game snapshot has been received.
    pub async fn wait_for_game(&self) -> Result<Arc<MatchState>, SessionError> {
        let mut receiver = self.match_state.clone();
        let state = receiver
            .wait_for(|state| state.current_game.is_some())
            .await
            .map_err(|_| SessionError::Bus(anyhow::anyhow!("Connection task stopped")))?;
        Ok(Arc::clone(&state))
    }

    /// Close the stream and forget the session; the task keeps running so
    /// another session can be joined.
    pub fn disconnect(&self) -> Result<(), SessionError> {
        tracing::info!("Leaving session");
        self.command_bus.disconnect()?;
        Ok(())
    }

    /// Stop the connection task.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.shutdown();
        }
    }
}

impl Drop for SessionService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Map a command reply that should have been an acknowledgement.
pub(crate) fn expect_ack(
    command: &'static str,
    reply: ServerMessage,
    accepted: MessageKind,
) -> Result<ServerMessage, SessionError> {
    match reply {
        ServerMessage::Error { msg } => Err(SessionError::Rejected(msg)),
        reply if reply.kind() == accepted || reply.kind() == MessageKind::Unknown => Ok(reply),
        reply => Err(SessionError::UnexpectedReply {
            command,
            kind: reply.kind(),
        }),
    }
}
