//! Command Bus for talking to the connection task.
//!
//! The connection task owns the transport, the dispatcher, the store and the
//! cleanup registry. Everything else reaches them through this bus, so all
//! mutation stays on that one task.
//!
//! Commands support both fire-and-forget and request-response use. In both
//! cases the backend's reply is delivered to the dispatcher unless the
//! caller asks for it to be suppressed.

use anyhow::Result;
use satchel_shared::{ClientMessage, ServerMessage};
use tokio::sync::{mpsc, oneshot};

use super::cleanup::CleanupCallback;
use super::dispatcher::{HandlerHandle, Registration};
use crate::ports::outbound::TransportError;

/// What a posted command resolves to.
pub type CommandReply = Result<ServerMessage, TransportError>;

/// Message types sent through the command bus to the connection task.
pub enum BusMessage {
    /// Open the persistent stream at this address
    Connect { address: String },
    /// Clean, user-initiated disconnect
    Disconnect,
    /// Post a command to the action endpoint
    Send {
        command: ClientMessage,
        /// Do not hand the reply to the dispatcher
        suppress_handlers: bool,
        reply: Option<oneshot::Sender<CommandReply>>,
    },
    Register {
        registration: Registration,
        handle_tx: oneshot::Sender<HandlerHandle>,
    },
    Unregister(HandlerHandle),
    UnregisterIdentifier(String),
    AddCleanup {
        identifier: String,
        callback: CleanupCallback,
    },
}

impl std::fmt::Debug for BusMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusMessage::Connect { address } => {
                f.debug_struct("Connect").field("address", address).finish()
            }
            BusMessage::Disconnect => f.write_str("Disconnect"),
            BusMessage::Send {
                command,
                suppress_handlers,
                reply,
            } => f
                .debug_struct("Send")
                .field("command", &command.type_name())
                .field("suppress_handlers", suppress_handlers)
                .field("awaiting_reply", &reply.is_some())
                .finish(),
            BusMessage::Register { registration, .. } => {
                f.debug_tuple("Register").field(registration).finish()
            }
            BusMessage::Unregister(handle) => f.debug_tuple("Unregister").field(handle).finish(),
            BusMessage::UnregisterIdentifier(identifier) => f
                .debug_tuple("UnregisterIdentifier")
                .field(identifier)
                .finish(),
            BusMessage::AddCleanup { identifier, .. } => f
                .debug_struct("AddCleanup")
                .field("identifier", identifier)
                .finish_non_exhaustive(),
        }
    }
}

/// Command bus for the connection task.
///
/// This is a concrete struct (not a trait) that can be cloned and shared.
/// Services depend on this directly rather than through a trait object.
#[derive(Clone)]
pub struct CommandBus {
    tx: mpsc::Sender<BusMessage>,
}

impl CommandBus {
    pub fn new(tx: mpsc::Sender<BusMessage>) -> Self {
        Self { tx }
    }

    /// Send a fire-and-forget command.
    ///
    /// Returns immediately after queueing the message. The reply, if any, is
    /// delivered to the registered handlers.
    pub fn send(&self, command: ClientMessage) -> Result<()> {
        self.try_send(BusMessage::Send {
            command,
            suppress_handlers: false,
            reply: None,
        })
    }

    /// Send a command and await its reply.
    ///
    /// The reply is also delivered to the registered handlers.
    pub async fn request(&self, command: ClientMessage) -> Result<ServerMessage> {
        self.request_inner(command, false).await
    }

    /// Send a command and await its reply without dispatching it.
    pub async fn request_suppressed(&self, command: ClientMessage) -> Result<ServerMessage> {
        self.request_inner(command, true).await
    }

    async fn request_inner(
        &self,
        command: ClientMessage,
        suppress_handlers: bool,
    ) -> Result<ServerMessage> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(BusMessage::Send {
                command,
                suppress_handlers,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| anyhow::anyhow!("CommandBus request failed: channel closed"))?;

        let reply = reply_rx
            .await
            .map_err(|_| anyhow::anyhow!("Connection task dropped the request"))?;
        Ok(reply?)
    }

    /// Register a message handler; resolves once the dispatcher holds it.
    pub async fn register(&self, registration: Registration) -> Result<HandlerHandle> {
        let (handle_tx, handle_rx) = oneshot::channel();
        self.tx
            .send(BusMessage::Register {
                registration,
                handle_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("CommandBus register failed: channel closed"))?;
        handle_rx
            .await
            .map_err(|_| anyhow::anyhow!("Connection task dropped the registration"))
    }

    pub fn unregister(&self, handle: HandlerHandle) -> Result<()> {
        self.try_send(BusMessage::Unregister(handle))
    }

    pub fn unregister_identifier(&self, identifier: impl Into<String>) -> Result<()> {
        self.try_send(BusMessage::UnregisterIdentifier(identifier.into()))
    }

    /// Register a callback to run if the session is lost for good.
    pub fn add_cleanup(
        &self,
        identifier: impl Into<String>,
        callback: impl FnOnce() + Send + 'static,
    ) -> Result<()> {
        self.try_send(BusMessage::AddCleanup {
            identifier: identifier.into(),
            callback: Box::new(callback),
        })
    }

    pub fn connect(&self, address: impl Into<String>) -> Result<()> {
        self.try_send(BusMessage::Connect {
            address: address.into(),
        })
    }

    pub fn disconnect(&self) -> Result<()> {
        self.try_send(BusMessage::Disconnect)
    }

    fn try_send(&self, message: BusMessage) -> Result<()> {
        self.tx
            .try_send(message)
            .map_err(|e| anyhow::anyhow!("CommandBus send failed: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satchel_shared::MessageKind;

    #[tokio::test]
    async fn test_send_command() {
        let (tx, mut rx) = mpsc::channel(10);
        let bus = CommandBus::new(tx);

        bus.send(ClientMessage::GetGameInfo).expect("send");

        let received = rx.recv().await.expect("message");
        assert!(matches!(
            received,
            BusMessage::Send {
                command: ClientMessage::GetGameInfo,
                suppress_handlers: false,
                reply: None,
            }
        ));
    }

    #[tokio::test]
    async fn request_resolves_with_reply() {
        let (tx, mut rx) = mpsc::channel(10);
        let bus = CommandBus::new(tx);

        let responder = tokio::spawn(async move {
            if let Some(BusMessage::Send {
                suppress_handlers,
                reply: Some(reply),
                ..
            }) = rx.recv().await
            {
                assert!(suppress_handlers);
                let _ = reply.send(Ok(ServerMessage::ItemsImported { success: true }));
            }
        });

        let reply = bus
            .request_suppressed(ClientMessage::ToggleSelling)
            .await
            .expect("reply");
        assert_eq!(reply, ServerMessage::ItemsImported { success: true });
        responder.await.expect("responder");
    }

    #[tokio::test]
    async fn request_surfaces_transport_errors() {
        let (tx, mut rx) = mpsc::channel(10);
        let bus = CommandBus::new(tx);

        tokio::spawn(async move {
            if let Some(BusMessage::Send {
                reply: Some(reply), ..
            }) = rx.recv().await
            {
                let _ = reply.send(Err(TransportError::Request("503".into())));
            }
        });

        let err = bus
            .request(ClientMessage::GetGameInfo)
            .await
            .expect_err("transport error");
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn closed_task_is_an_error() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let bus = CommandBus::new(tx);

        assert!(bus.send(ClientMessage::GetGameInfo).is_err());
        assert!(bus
            .register(Registration::new(MessageKind::Error, |_, _| Ok(())))
            .await
            .is_err());
    }
}
