//! Message Dispatcher - routes inbound messages to registered handlers.
//!
//! Handlers are keyed by [`MessageKind`]. A registration may carry an
//! identifier; registering again under the same identifier replaces the
//! earlier registration, so re-registering from a re-mounted view never
//! causes double delivery. Registrations without an identifier are removed
//! through the [`HandlerHandle`] returned by `register`.

use std::panic::{catch_unwind, AssertUnwindSafe};

use satchel_domain::DomainError;
use satchel_shared::{ClientMessage, MessageKind, ServerMessage};
use thiserror::Error;

use super::session_event::SessionEvent;
use crate::state::{MatchPatch, MatchState, MatchStateStore};

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Handler rejected message: {0}")]
    Rejected(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

pub type HandlerResult = Result<(), HandlerError>;

pub type HandlerCallback =
    Box<dyn FnMut(&ServerMessage, &mut HandlerContext<'_>) -> HandlerResult + Send + 'static>;

/// What a handler may touch while it runs.
pub struct HandlerContext<'a> {
    store: &'a mut MatchStateStore,
    outbox: &'a mut Vec<ClientMessage>,
    events: &'a mut Vec<SessionEvent>,
    remove_current: bool,
}

impl<'a> HandlerContext<'a> {
    pub fn new(
        store: &'a mut MatchStateStore,
        outbox: &'a mut Vec<ClientMessage>,
        events: &'a mut Vec<SessionEvent>,
    ) -> Self {
        Self {
            store,
            outbox,
            events,
            remove_current: false,
        }
    }

    pub fn state(&self) -> &MatchState {
        self.store.state()
    }

    pub fn apply(&mut self, patch: MatchPatch) {
        self.store.apply(patch);
    }

    pub fn replace(&mut self, state: MatchState) {
        self.store.replace(state);
    }

    /// Queue a follow-up command; sent after the dispatch completes.
    pub fn send(&mut self, command: ClientMessage) {
        self.outbox.push(command);
    }

    pub fn emit(&mut self, event: SessionEvent) {
        self.events.push(event);
    }

    /// Drop the running registration once it returns (one-shot handlers).
    pub fn remove_registration(&mut self) {
        self.remove_current = true;
    }
}

/// A handler plus its routing metadata.
pub struct Registration {
    identifier: Option<String>,
    kind: MessageKind,
    persistent: bool,
    callback: HandlerCallback,
}

impl Registration {
    pub fn new(
        kind: MessageKind,
        callback: impl FnMut(&ServerMessage, &mut HandlerContext<'_>) -> HandlerResult
            + Send
            + 'static,
    ) -> Self {
        Self {
            identifier: None,
            kind,
            persistent: false,
            callback: Box::new(callback),
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Keep this registration across a clean disconnect.
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("identifier", &self.identifier)
            .field("kind", &self.kind)
            .field("persistent", &self.persistent)
            .finish_non_exhaustive()
    }
}

/// Returned by `register`; removes exactly that registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerHandle(u64);

struct Entry {
    handle: HandlerHandle,
    registration: Registration,
}

/// Outcome of one dispatch, mostly for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub invoked: usize,
    pub failed: usize,
}

#[derive(Default)]
pub struct MessageDispatcher {
    entries: Vec<Entry>,
    next_handle: u64,
}

impl MessageDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, registration: Registration) -> HandlerHandle {
        if let Some(identifier) = registration.identifier() {
            let before = self.entries.len();
            self.entries
                .retain(|entry| entry.registration.identifier() != Some(identifier));
            if self.entries.len() != before {
                tracing::debug!(identifier = %identifier, "Replacing handler registration");
            }
        }

        self.next_handle += 1;
        let handle = HandlerHandle(self.next_handle);
        self.entries.push(Entry {
            handle,
            registration,
        });
        handle
    }

    pub fn unregister(&mut self, handle: HandlerHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.handle != handle);
        self.entries.len() != before
    }

    pub fn unregister_identifier(&mut self, identifier: &str) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|entry| entry.registration.identifier() != Some(identifier));
        self.entries.len() != before
    }

    pub fn contains_identifier(&self, identifier: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.registration.identifier() == Some(identifier))
    }

    /// Drop every non-persistent registration. Returns how many went away.
    pub fn retain_persistent(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.registration.is_persistent());
        before - self.entries.len()
    }

    pub fn handler_count(&self) -> usize {
        self.entries.len()
    }

    pub fn handlers_for(&self, kind: MessageKind) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.registration.kind() == kind)
            .count()
    }

    /// Invoke, in registration order, every handler registered for the
    /// message's kind. A failing or panicking handler is logged and the
    /// remaining handlers still run.
    pub fn dispatch(
        &mut self,
        message: &ServerMessage,
        store: &mut MatchStateStore,
        outbox: &mut Vec<ClientMessage>,
        events: &mut Vec<SessionEvent>,
    ) -> DispatchReport {
        let kind = message.kind();
        let mut report = DispatchReport::default();
        let mut finished = Vec::new();

        for entry in self
            .entries
            .iter_mut()
            .filter(|entry| entry.registration.kind == kind)
        {
            report.invoked += 1;
            let mut ctx = HandlerContext::new(store, outbox, events);
            let callback = &mut entry.registration.callback;
            let outcome = catch_unwind(AssertUnwindSafe(|| callback(message, &mut ctx)));

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::warn!(
                        kind = %kind,
                        identifier = ?entry.registration.identifier,
                        error = %e,
                        "Message handler failed"
                    );
                }
                Err(_) => {
                    report.failed += 1;
                    tracing::error!(
                        kind = %kind,
                        identifier = ?entry.registration.identifier,
                        "Message handler panicked"
                    );
                }
            }

            if ctx.remove_current {
                finished.push(entry.handle);
            }
        }

        if !finished.is_empty() {
            self.entries.retain(|entry| !finished.contains(&entry.handle));
        }
        if report.invoked == 0 {
            tracing::trace!(kind = %kind, "No handler registered for message kind");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use proptest::prelude::*;

    struct Harness {
        dispatcher: MessageDispatcher,
        store: MatchStateStore,
        outbox: Vec<ClientMessage>,
        events: Vec<SessionEvent>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                dispatcher: MessageDispatcher::new(),
                store: MatchStateStore::new(),
                outbox: Vec::new(),
                events: Vec::new(),
            }
        }

        fn dispatch(&mut self, message: &ServerMessage) -> DispatchReport {
            self.dispatcher
                .dispatch(message, &mut self.store, &mut self.outbox, &mut self.events)
        }
    }

    fn error(msg: &str) -> ServerMessage {
        ServerMessage::Error { msg: msg.into() }
    }

    fn counting(kind: MessageKind, counter: &Arc<AtomicU32>) -> Registration {
        let counter = Arc::clone(counter);
        Registration::new(kind, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn same_identifier_replaces_previous_registration() {
        let mut harness = Harness::new();
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));

        harness
            .dispatcher
            .register(counting(MessageKind::Error, &first).with_identifier("errors"));
        harness
            .dispatcher
            .register(counting(MessageKind::Error, &second).with_identifier("errors"));

        harness.dispatch(&error("boom"));

        assert_eq!(harness.dispatcher.handler_count(), 1);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn anonymous_registrations_are_never_deduplicated() {
        let mut harness = Harness::new();
        let count = Arc::new(AtomicU32::new(0));

        let handle = harness
            .dispatcher
            .register(counting(MessageKind::Error, &count));
        harness
            .dispatcher
            .register(counting(MessageKind::Error, &count));

        harness.dispatch(&error("boom"));
        assert_eq!(count.load(Ordering::SeqCst), 2);

        assert!(harness.dispatcher.unregister(handle));
        assert!(!harness.dispatcher.unregister(handle));
        harness.dispatch(&error("boom"));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let mut harness = Harness::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            harness.dispatcher.register(Registration::new(
                MessageKind::Notification,
                move |_, _| {
                    order.lock().expect("lock").push(label);
                    Ok(())
                },
            ));
        }

        harness.dispatch(&ServerMessage::Notification { msg: "hi".into() });

        assert_eq!(*order.lock().expect("lock"), vec!["a", "b", "c"]);
    }

    #[test]
    fn failures_are_isolated_per_handler() {
        let mut harness = Harness::new();
        let count = Arc::new(AtomicU32::new(0));

        harness
            .dispatcher
            .register(Registration::new(MessageKind::Error, |_, _| {
                Err(HandlerError::Rejected("nope".into()))
            }));
        harness
            .dispatcher
            .register(Registration::new(MessageKind::Error, |_, _| {
                panic!("handler bug")
            }));
        harness
            .dispatcher
            .register(counting(MessageKind::Error, &count));

        let report = harness.dispatch(&error("boom"));

        assert_eq!(report, DispatchReport { invoked: 3, failed: 2 });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn one_shot_handler_removes_itself() {
        let mut harness = Harness::new();
        harness.dispatcher.register(
            Registration::new(MessageKind::ItemsImported, |_, ctx| {
                ctx.send(ClientMessage::GetGameInfo);
                ctx.remove_registration();
                Ok(())
            })
            .with_identifier("import_items_handler"),
        );

        harness.dispatch(&ServerMessage::ItemsImported { success: true });
        harness.dispatch(&ServerMessage::ItemsImported { success: true });

        assert!(!harness.dispatcher.contains_identifier("import_items_handler"));
        assert_eq!(harness.outbox, vec![ClientMessage::GetGameInfo]);
    }

    #[test]
    fn retain_persistent_drops_transient_handlers() {
        let mut harness = Harness::new();
        let count = Arc::new(AtomicU32::new(0));
        harness
            .dispatcher
            .register(counting(MessageKind::Error, &count).persistent());
        harness
            .dispatcher
            .register(counting(MessageKind::Error, &count).with_identifier("toast"));

        assert_eq!(harness.dispatcher.retain_persistent(), 1);
        assert!(!harness.dispatcher.contains_identifier("toast"));
        assert_eq!(harness.dispatcher.handlers_for(MessageKind::Error), 1);
    }

    #[test]
    fn unregistered_kind_is_ignored() {
        let mut harness = Harness::new();
        let report = harness.dispatch(&ServerMessage::Unknown);
        assert_eq!(report, DispatchReport::default());
    }

    fn kind() -> impl Strategy<Value = MessageKind> {
        prop::sample::select(MessageKind::ALL.to_vec())
    }

    fn message_of(kind: MessageKind) -> ServerMessage {
        match kind {
            MessageKind::GameInfo => ServerMessage::GameInfo {
                msg: Default::default(),
            },
            MessageKind::InventoryUpdate => ServerMessage::InventoryUpdate {
                msg: satchel_shared::InventoryUpdate {
                    player_id: satchel_domain::PlayerId::new(1),
                    item_id: satchel_domain::ItemId::new(1),
                    item: satchel_domain::ItemInstance {
                        id: satchel_domain::ItemId::new(1),
                        prefab_id: None,
                        name: "Rope".into(),
                        description: String::new(),
                        image: String::new(),
                        rarity: satchel_domain::ItemRarity::Mundane,
                        item_type: satchel_domain::ItemType::AdventureGear,
                        value: 1,
                        count: 1,
                    },
                },
            },
            MessageKind::GoldUpdate => ServerMessage::GoldUpdate {
                msg: satchel_shared::GoldUpdate {
                    player_id: satchel_domain::PlayerId::new(1),
                    gold: 1,
                },
            },
            MessageKind::ItemRemoval => ServerMessage::ItemRemoval {
                msg: satchel_shared::ItemRemoval {
                    player_id: satchel_domain::PlayerId::new(1),
                    item_id: satchel_domain::ItemId::new(1),
                },
            },
            MessageKind::LootUpdate => ServerMessage::LootUpdate {
                msg: Default::default(),
            },
            MessageKind::Error => error("e"),
            MessageKind::Notification => ServerMessage::Notification { msg: "n".into() },
            MessageKind::Register => ServerMessage::Register {
                token: None,
                registration_token: None,
            },
            MessageKind::SyncToken => ServerMessage::SyncToken {
                sync_token: "s".into(),
            },
            MessageKind::ItemsImported => ServerMessage::ItemsImported { success: true },
            MessageKind::SellingToggled => ServerMessage::SellingToggled { msg: true },
            MessageKind::Unknown => ServerMessage::Unknown,
        }
    }

    #[derive(Debug, Clone)]
    enum Op {
        Register { identifier: u8, kind: MessageKind },
        Dispatch(MessageKind),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..4, kind()).prop_map(|(identifier, kind)| Op::Register { identifier, kind }),
            kind().prop_map(Op::Dispatch),
        ]
    }

    proptest! {
        #[test]
        fn identifiers_stay_unique_and_kinds_never_cross(ops in prop::collection::vec(op(), 0..60)) {
            let mut harness = Harness::new();
            let deliveries: Arc<Mutex<Vec<(u8, MessageKind, MessageKind)>>> =
                Arc::new(Mutex::new(Vec::new()));

            for op in ops {
                match op {
                    Op::Register { identifier, kind } => {
                        let deliveries = Arc::clone(&deliveries);
                        harness.dispatcher.register(
                            Registration::new(kind, move |message, _| {
                                deliveries
                                    .lock()
                                    .expect("lock")
                                    .push((identifier, kind, message.kind()));
                                Ok(())
                            })
                            .with_identifier(format!("handler-{identifier}")),
                        );
                    }
                    Op::Dispatch(kind) => {
                        deliveries.lock().expect("lock").clear();
                        let message = message_of(kind);
                        harness.dispatch(&message);

                        let seen = deliveries.lock().expect("lock").clone();
                        let mut identifiers: Vec<u8> = seen.iter().map(|(id, _, _)| *id).collect();
                        identifiers.sort_unstable();
                        identifiers.dedup();
                        prop_assert_eq!(identifiers.len(), seen.len(), "double delivery");
                        for (_, registered, delivered) in seen {
                            prop_assert_eq!(registered, delivered);
                        }
                    }
                }
            }

            prop_assert!(harness.dispatcher.handler_count() <= 4);
        }
    }
}
