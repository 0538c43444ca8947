//! Connection manager - the task that owns a session.
//!
//! Drives [`ConnectionMachine`] against a real [`TransportChannel`] and
//! [`ActionEndpoint`], and owns everything that must only be touched from one
//! place: the dispatcher, the match state store and the cleanup registry.
//! Other code talks to it through the [`CommandBus`](crate::infrastructure::messaging::CommandBus).
//!
//! Inputs handled by the main loop, one at a time:
//! - bus messages (commands, registrations, connect / disconnect)
//! - frames and closes from the stream (only while it is open)
//! - replies to posted commands
//! - results of stream opens, which run on their own task
//! - the single pending retry timer

use std::collections::VecDeque;
use std::sync::atomic::AtomicU8;
use std::sync::Arc;

use satchel_shared::{encode_command, parse_server_value, ClientMessage, ServerMessage};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use url::Url;

use super::core::{ConnectionAction, ConnectionMachine, RetryPolicy};
use super::shared::{
    lift, parse_server_message, stream_address, ParsedServerMessage, OPEN_TIMEOUT,
};
use crate::infrastructure::messaging::{
    set_connection_state, BusMessage, CleanupRegistry, CommandReply, MessageDispatcher,
    RetrySignal, SessionEvent,
};
use crate::ports::outbound::{ActionEndpoint, TransportChannel, TransportError, TransportEvent};
use crate::state::{register_store_handlers, MatchState, MatchStateStore};

/// Static settings for one manager.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Backend base URL; stream and action addresses derive from it
    pub backend_url: Url,
    pub retry_policy: RetryPolicy,
}

/// Reply of a posted command, routed back into the main loop.
struct PostedReply {
    command: &'static str,
    suppress_handlers: bool,
    result: Result<Value, TransportError>,
    reply: Option<oneshot::Sender<CommandReply>>,
}

/// A finished stream open; hands the transport back to the main loop.
struct OpenedTransport {
    generation: u64,
    address: String,
    transport: Box<dyn TransportChannel>,
    result: Result<(), TransportError>,
}

/// Where the manager publishes what the UI observes.
pub(crate) struct Publishers {
    pub state: Arc<AtomicU8>,
    pub match_state: watch::Sender<Arc<MatchState>>,
    pub events: broadcast::Sender<SessionEvent>,
}

pub struct ConnectionManager {
    settings: ManagerSettings,
    machine: ConnectionMachine,
    dispatcher: MessageDispatcher,
    store: MatchStateStore,
    cleanup: CleanupRegistry,
    /// `None` while an open is in flight
    transport: Option<Box<dyn TransportChannel>>,
    endpoint: Arc<dyn ActionEndpoint>,
    replies_tx: mpsc::UnboundedSender<PostedReply>,
    replies_rx: mpsc::UnboundedReceiver<PostedReply>,
    opens_tx: mpsc::UnboundedSender<OpenedTransport>,
    opens_rx: mpsc::UnboundedReceiver<OpenedTransport>,
    open_generation: u64,
    /// Generation of the open whose result the machine is waiting for
    awaited_open: Option<u64>,
    /// Open requested while an abandoned one still holds the transport
    queued_open: Option<String>,
    /// (attempt, deadline) of the one outstanding retry timer
    retry_timer: Option<(u32, Instant)>,
    publishers: Publishers,
    published_revision: u64,
}

impl ConnectionManager {
    pub(crate) fn new(
        settings: ManagerSettings,
        transport: Box<dyn TransportChannel>,
        endpoint: Arc<dyn ActionEndpoint>,
        publishers: Publishers,
    ) -> Self {
        let mut dispatcher = MessageDispatcher::new();
        register_store_handlers(&mut dispatcher);
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        let (opens_tx, opens_rx) = mpsc::unbounded_channel();

        Self {
            machine: ConnectionMachine::new(settings.retry_policy),
            settings,
            dispatcher,
            store: MatchStateStore::new(),
            cleanup: CleanupRegistry::new(),
            transport: Some(transport),
            endpoint,
            replies_tx,
            replies_rx,
            opens_tx,
            opens_rx,
            open_generation: 0,
            awaited_open: None,
            queued_open: None,
            retry_timer: None,
            publishers,
            published_revision: 0,
        }
    }

    /// Main loop: runs until shutdown is requested or every bus sender is gone.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<BusMessage>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        loop {
            let stream_live = self.machine.is_stream_live();
            let retry_deadline = self.retry_timer.map(|(_, deadline)| deadline);

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    self.disconnect().await;
                    break;
                }

                command = commands.recv() => match command {
                    Some(message) => self.handle_bus_message(message).await,
                    None => {
                        tracing::info!("Command bus closed, stopping connection task");
                        self.disconnect().await;
                        break;
                    }
                },

                event = next_stream_event(self.transport.as_mut()), if stream_live => {
                    self.handle_transport_event(event).await;
                }

                Some(reply) = self.replies_rx.recv() => {
                    self.handle_reply(reply).await;
                }

                Some(opened) = self.opens_rx.recv() => {
                    self.handle_opened(opened).await;
                }

                _ = sleep_until(retry_deadline.unwrap_or_else(Instant::now)), if retry_deadline.is_some() => {
                    if let Some((attempt, _)) = self.retry_timer.take() {
                        let actions = self.machine.retry_timer_fired(attempt);
                        self.execute(actions).await;
                    }
                }
            }

            self.publish_state();
        }

        self.publish_state();
    }

    async fn handle_bus_message(&mut self, message: BusMessage) {
        match message {
            BusMessage::Connect { address } => {
                let actions = self.machine.connect(&address);
                self.execute(actions).await;
            }
            BusMessage::Disconnect => self.disconnect().await,
            BusMessage::Send {
                command,
                suppress_handlers,
                reply,
            } => self.post(command, suppress_handlers, reply),
            BusMessage::Register {
                registration,
                handle_tx,
            } => {
                let handle = self.dispatcher.register(registration);
                let _ = handle_tx.send(handle);
            }
            BusMessage::Unregister(handle) => {
                self.dispatcher.unregister(handle);
            }
            BusMessage::UnregisterIdentifier(identifier) => {
                self.dispatcher.unregister_identifier(&identifier);
            }
            BusMessage::AddCleanup {
                identifier,
                callback,
            } => {
                self.cleanup.add(identifier, callback);
            }
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Frame(text) => match parse_server_message(&text) {
                Ok(ParsedServerMessage::SyncToken(token)) => {
                    tracing::trace!("Stored resync token");
                    self.machine.set_resync_token(token);
                }
                Ok(ParsedServerMessage::Other(message)) => self.deliver(*message, false).await,
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping malformed frame");
                }
            },
            TransportEvent::Closed { reason } => {
                tracing::info!(reason = ?reason, "Stream closed");
                let actions = self.machine.transport_closed();
                self.execute(actions).await;
            }
        }
    }

    async fn handle_reply(&mut self, posted: PostedReply) {
        let PostedReply {
            command,
            suppress_handlers,
            result,
            reply,
        } = posted;

        let parsed = result.and_then(|value| {
            if value.is_null() {
                return Ok(ServerMessage::Unknown);
            }
            parse_server_value(value).map_err(|e| TransportError::InvalidReply(e.to_string()))
        });

        match parsed {
            Ok(message) => {
                tracing::debug!(command, kind = %message.kind(), "Command reply received");
                if let Some(reply) = reply {
                    let _ = reply.send(Ok(message.clone()));
                }
                self.deliver(message, suppress_handlers).await;
            }
            Err(e) => {
                tracing::warn!(command, error = %e, "Command failed");
                if let Some(reply) = reply {
                    let _ = reply.send(Err(e));
                }
            }
        }
    }

    /// Handle one inbound message from either channel.
    ///
    /// Handshake messages and resync markers are consumed here; everything
    /// else goes to the dispatcher unless suppressed.
    async fn deliver(&mut self, message: ServerMessage, suppress_handlers: bool) {
        let message = match lift(message) {
            ParsedServerMessage::SyncToken(token) => {
                self.machine.set_resync_token(token);
                return;
            }
            ParsedServerMessage::Other(message) => *message,
        };

        match message {
            ServerMessage::Register {
                token,
                registration_token,
            } => {
                self.handle_handshake(token, registration_token).await;
            }
            ServerMessage::Unknown => {
                tracing::trace!("Ignoring message of unknown kind");
            }
            message if !suppress_handlers => self.dispatch(&message),
            _ => {}
        }
    }

    async fn handle_handshake(
        &mut self,
        token: Option<String>,
        registration_token: Option<String>,
    ) {
        if let Some(registration_token) = registration_token {
            match stream_address(&self.settings.backend_url, &registration_token) {
                Some(address) => {
                    tracing::info!(address = %address, "Registered, opening stream");
                    let actions = self.machine.connect(&address);
                    self.execute(actions).await;
                }
                None => {
                    tracing::error!(
                        backend_url = %self.settings.backend_url,
                        "Cannot build a stream address from the backend URL"
                    );
                }
            }
        }

        if let Some(token) = token {
            tracing::info!("Session token received, requesting game info");
            self.machine.set_session_token(token);
            self.post(ClientMessage::GetGameInfo, false, None);
        }
    }

    fn dispatch(&mut self, message: &ServerMessage) {
        let mut outbox = Vec::new();
        let mut events = Vec::new();
        let report =
            self.dispatcher
                .dispatch(message, &mut self.store, &mut outbox, &mut events);
        if report.failed > 0 {
            tracing::warn!(
                kind = %message.kind(),
                failed = report.failed,
                invoked = report.invoked,
                "Some handlers failed"
            );
        }

        for event in events {
            self.emit(event);
        }
        for command in outbox {
            self.post(command, false, None);
        }
    }

    /// Post a command on its own task; the reply comes back through
    /// `replies_rx` so handling stays on this task.
    fn post(
        &self,
        command: ClientMessage,
        suppress_handlers: bool,
        reply: Option<oneshot::Sender<CommandReply>>,
    ) {
        let name = command.type_name();
        let envelope = match encode_command(&command, self.machine.session_token()) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(command = name, error = %e, "Failed to encode command");
                if let Some(reply) = reply {
                    let _ = reply.send(Err(TransportError::Request(e.to_string())));
                }
                return;
            }
        };

        tracing::debug!(command = name, "Posting command");
        let endpoint = Arc::clone(&self.endpoint);
        let replies = self.replies_tx.clone();
        tokio::spawn(async move {
            let result = endpoint.post(envelope).await;
            let _ = replies.send(PostedReply {
                command: name,
                suppress_handlers,
                result,
                reply,
            });
        });
    }

    async fn execute(&mut self, actions: Vec<ConnectionAction>) {
        let mut queue: VecDeque<ConnectionAction> = actions.into();

        while let Some(action) = queue.pop_front() {
            match action {
                ConnectionAction::OpenTransport { address } => self.start_open(address),
                ConnectionAction::CloseTransport => self.close_transport().await,
                ConnectionAction::ScheduleRetry { attempt, delay } => {
                    self.retry_timer = Some((attempt, Instant::now() + delay));
                }
                ConnectionAction::CancelRetry => self.retry_timer = None,
                ConnectionAction::SendCommand(command) => self.post(command, false, None),
                ConnectionAction::NotifyConnected => self.emit(SessionEvent::Connected),
                ConnectionAction::NotifyRetry(signal) => {
                    self.emit(SessionEvent::Retrying(signal));
                    if signal == RetrySignal::Recovered && self.machine.session_token().is_some()
                    {
                        // Resume may skip events; always ask for a fresh snapshot.
                        self.post(ClientMessage::GetGameInfo, false, None);
                    }
                }
                ConnectionAction::RunCleanup => {
                    self.retry_timer = None;
                    self.close_transport().await;
                    let ran = self.cleanup.run_all();
                    self.store.reset();
                    tracing::error!(cleanup_handlers = ran, "Session lost");
                    self.emit(SessionEvent::SessionLost);
                }
                ConnectionAction::ReportStartupFailure { address } => {
                    tracing::error!(address = %address, "Backend unreachable");
                    self.store.reset();
                    self.emit(SessionEvent::BackendUnreachable);
                }
            }
            set_connection_state(&self.publishers.state, self.machine.state());
        }
    }

    /// Open the stream on its own task so the loop keeps serving commands,
    /// replies and disconnects while the handshake is pending.
    fn start_open(&mut self, address: String) {
        let Some(mut transport) = self.transport.take() else {
            // An abandoned open still holds the transport.
            self.awaited_open = None;
            self.queued_open = Some(address);
            return;
        };

        self.open_generation += 1;
        let generation = self.open_generation;
        self.awaited_open = Some(generation);
        let opens = self.opens_tx.clone();
        tokio::spawn(async move {
            let result = match tokio::time::timeout(OPEN_TIMEOUT, transport.open(&address)).await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::Connect {
                    address: address.clone(),
                    reason: format!("no answer within {}s", OPEN_TIMEOUT.as_secs()),
                }),
            };
            let _ = opens.send(OpenedTransport {
                generation,
                address,
                transport,
                result,
            });
        });
    }

    async fn handle_opened(&mut self, opened: OpenedTransport) {
        let OpenedTransport {
            generation,
            address,
            mut transport,
            result,
        } = opened;

        if self.awaited_open != Some(generation) {
            tracing::debug!(address = %address, "Discarding abandoned stream open");
            if result.is_ok() {
                transport.close().await;
            }
            self.transport = Some(transport);
            if let Some(address) = self.queued_open.take() {
                self.start_open(address);
            }
            return;
        }

        self.awaited_open = None;
        self.transport = Some(transport);
        let actions = match result {
            Ok(()) => {
                tracing::info!(address = %address, "Stream open");
                self.machine.transport_opened()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to open stream");
                self.machine.transport_closed()
            }
        };
        self.execute(actions).await;
    }

    async fn close_transport(&mut self) {
        self.queued_open = None;
        match self.transport.as_mut() {
            Some(transport) => transport.close().await,
            // Still opening; the result is discarded when it arrives.
            None => self.awaited_open = None,
        }
    }

    /// Clean disconnect: no cleanup handlers, session-scoped handlers dropped.
    async fn disconnect(&mut self) {
        let actions = self.machine.disconnect();
        self.execute(actions).await;
        self.retry_timer = None;

        let dropped = self.dispatcher.retain_persistent();
        if dropped > 0 {
            tracing::debug!(dropped, "Dropped session handlers on disconnect");
        }
        self.store.reset();
        set_connection_state(&self.publishers.state, self.machine.state());
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.publishers.events.send(event);
    }

    fn publish_state(&mut self) {
        let revision = self.store.revision();
        if revision != self.published_revision {
            self.published_revision = revision;
            self.publishers.match_state.send_replace(self.store.snapshot());
        }
    }
}

async fn next_stream_event(transport: Option<&mut Box<dyn TransportChannel>>) -> TransportEvent {
    match transport {
        Some(transport) => transport.next_event().await,
        None => std::future::pending().await,
    }
}
