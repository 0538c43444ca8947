//! Messaging layer between the services and the connection task.
//!
//! - `CommandBus`: queue commands and lifecycle requests for the connection task
//! - `MessageDispatcher`: route inbound messages to registered handlers
//! - `CleanupRegistry`: teardown callbacks for a lost session
//! - `ConnectionHandle` / `ConnectionStateObserver`: lifecycle control and state
//! - `SessionEvent`: notifications broadcast to the UI

pub mod cleanup;
pub mod command_bus;
pub mod connection;
pub mod dispatcher;
pub mod session_event;

pub use cleanup::{CleanupCallback, CleanupRegistry};
pub use command_bus::{BusMessage, CommandBus, CommandReply};
pub use connection::{
    set_connection_state, ConnectionHandle, ConnectionState, ConnectionStateObserver, RetrySignal,
};
pub use dispatcher::{
    DispatchReport, HandlerCallback, HandlerContext, HandlerError, HandlerHandle, HandlerResult,
    MessageDispatcher, Registration,
};
pub use session_event::SessionEvent;
