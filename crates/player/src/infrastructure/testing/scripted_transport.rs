//! Scripted `TransportChannel` for tests.
//!
//! The transport is handed to the connection manager while the test keeps the
//! [`TransportScript`] to push frames, drop the stream and make upcoming
//! opens fail or hang.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::ports::outbound::{TransportChannel, TransportError, TransportEvent};

enum OpenOutcome {
    Finish(Result<(), TransportError>),
    Hang,
}

#[derive(Default)]
struct State {
    open_results: VecDeque<OpenOutcome>,
    opened: Vec<String>,
    close_calls: usize,
}

pub struct ScriptedTransport {
    state: Arc<Mutex<State>>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Test-side controller for a [`ScriptedTransport`].
#[derive(Clone)]
pub struct TransportScript {
    state: Arc<Mutex<State>>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl ScriptedTransport {
    pub fn pair() -> (Self, TransportScript) {
        let state = Arc::new(Mutex::new(State::default()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                state: Arc::clone(&state),
                events_rx,
            },
            TransportScript { state, events_tx },
        )
    }
}

impl TransportScript {
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `count` opens fail. Opens succeed otherwise.
    pub fn fail_next_opens(&self, count: usize) {
        let mut state = self.lock();
        for _ in 0..count {
            state
                .open_results
                .push_back(OpenOutcome::Finish(Err(TransportError::Connect {
                    address: "scripted".into(),
                    reason: "connection refused".into(),
                })));
        }
    }

    /// Make the next `count` opens never resolve.
    pub fn hang_next_opens(&self, count: usize) {
        let mut state = self.lock();
        for _ in 0..count {
            state.open_results.push_back(OpenOutcome::Hang);
        }
    }

    pub fn push_frame(&self, text: impl Into<String>) {
        let _ = self.events_tx.send(TransportEvent::Frame(text.into()));
    }

    /// Simulate the peer dropping the stream.
    pub fn drop_stream(&self) {
        let _ = self.events_tx.send(TransportEvent::Closed {
            reason: Some("scripted drop".into()),
        });
    }

    /// Every address `open` was called with, successful or not.
    pub fn opened(&self) -> Vec<String> {
        self.lock().opened.clone()
    }

    pub fn close_calls(&self) -> usize {
        self.lock().close_calls
    }
}

impl ScriptedTransport {
    fn record_open(&self, address: &str) -> Option<OpenOutcome> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.opened.push(address.to_string());
        state.open_results.pop_front()
    }
}

#[async_trait::async_trait]
impl TransportChannel for ScriptedTransport {
    async fn open(&mut self, address: &str) -> Result<(), TransportError> {
        match self.record_open(address) {
            Some(OpenOutcome::Finish(result)) => result,
            Some(OpenOutcome::Hang) => std::future::pending().await,
            None => Ok(()),
        }
    }

    async fn next_event(&mut self) -> TransportEvent {
        match self.events_rx.recv().await {
            Some(event) => event,
            None => TransportEvent::Closed { reason: None },
        }
    }

    async fn close(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .close_calls += 1;
    }
}
