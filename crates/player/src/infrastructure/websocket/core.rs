//! Platform-agnostic connection lifecycle core.
//!
//! This is deliberately free of any runtime dependencies. Every input returns
//! the list of [`ConnectionAction`]s the driver must execute, so the whole
//! lifecycle (first connect, retries, resync hand-off, terminal failure) can
//! be tested without a socket or a clock.
//!
//! ```text
//!                 connect            opened
//! Disconnected ─────────> Connecting ───────> Open <──────────┐
//!      ^                      │                 │ closed      │ opened
//!      │ disconnect           │ closed          v             │
//!      └──────────────── Failed <──────────  Retrying ────────┘
//!                       (startup /  budget
//!                        failure)   exhausted
//! ```

use std::time::Duration;

use satchel_shared::ClientMessage;

use super::shared::{MAX_RETRY_ATTEMPTS, RETRY_DELAY};
use crate::infrastructure::messaging::{ConnectionState, RetrySignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRY_ATTEMPTS,
            delay: RETRY_DELAY,
        }
    }
}

/// Side effects requested by the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionAction {
    /// Open the stream at this address and report back with
    /// `transport_opened` or `transport_closed`
    OpenTransport { address: String },
    CloseTransport,
    /// Call `retry_timer_fired(attempt)` after `delay`
    ScheduleRetry { attempt: u32, delay: Duration },
    /// Forget any scheduled retry timer
    CancelRetry,
    SendCommand(ClientMessage),
    NotifyConnected,
    NotifyRetry(RetrySignal),
    /// Run cleanup handlers and wipe session state
    RunCleanup,
    /// The very first open failed; the backend is unreachable
    ReportStartupFailure { address: String },
}

#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    policy: RetryPolicy,
    address: Option<String>,
    retry_count: u32,
    pending_retry: Option<u32>,
    attempt_in_flight: bool,
    session_token: Option<String>,
    resync_token: Option<String>,
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl ConnectionMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            policy,
            address: None,
            retry_count: 0,
            pending_retry: None,
            attempt_in_flight: false,
            session_token: None,
            resync_token: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    pub fn resync_token(&self) -> Option<&str> {
        self.resync_token.as_deref()
    }

    /// True while frames can arrive on the stream.
    pub fn is_stream_live(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn set_session_token(&mut self, token: String) {
        self.session_token = Some(token);
    }

    pub fn set_resync_token(&mut self, token: String) {
        self.resync_token = Some(token);
    }

    pub fn connect(&mut self, address: &str) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Disconnected => {
                self.state = ConnectionState::Connecting;
                self.address = Some(address.to_string());
                vec![ConnectionAction::OpenTransport {
                    address: address.to_string(),
                }]
            }
            ConnectionState::Connecting | ConnectionState::Open | ConnectionState::Retrying => {
                tracing::warn!(
                    state = %self.state,
                    address = %address,
                    "Already connected or connecting, ignoring connect"
                );
                Vec::new()
            }
            ConnectionState::Failed => {
                tracing::warn!(
                    address = %address,
                    "Connection failed terminally, a new session is required"
                );
                Vec::new()
            }
        }
    }

    pub fn transport_opened(&mut self) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Connecting => self.open_succeeded(false),
            ConnectionState::Retrying if self.attempt_in_flight => self.open_succeeded(true),
            state => {
                tracing::debug!(state = %state, "Ignoring transport open outside of an attempt");
                Vec::new()
            }
        }
    }

    pub fn transport_closed(&mut self) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Connecting => {
                let address = self.address.clone().unwrap_or_default();
                tracing::error!(address = %address, "Backend unreachable on first connect");
                self.state = ConnectionState::Failed;
                self.clear_tokens();
                vec![ConnectionAction::ReportStartupFailure { address }]
            }
            ConnectionState::Open => {
                tracing::warn!("Connection lost, starting reconnect attempts");
                self.state = ConnectionState::Retrying;
                self.schedule_retry()
            }
            ConnectionState::Retrying if self.attempt_in_flight => {
                self.attempt_in_flight = false;
                tracing::info!(attempt = self.retry_count, "Reconnect attempt failed");
                self.schedule_retry()
            }
            ConnectionState::Retrying | ConnectionState::Disconnected | ConnectionState::Failed => {
                Vec::new()
            }
        }
    }

    pub fn retry_timer_fired(&mut self, attempt: u32) -> Vec<ConnectionAction> {
        if self.state != ConnectionState::Retrying || self.pending_retry != Some(attempt) {
            tracing::debug!(attempt, state = %self.state, "Ignoring stale retry timer");
            return Vec::new();
        }
        let Some(address) = self.address.clone() else {
            return Vec::new();
        };
        self.pending_retry = None;
        self.attempt_in_flight = true;
        tracing::info!(attempt, address = %address, "Reconnecting");
        vec![ConnectionAction::OpenTransport { address }]
    }

    /// Clean, user-initiated disconnect. Never runs cleanup handlers.
    pub fn disconnect(&mut self) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Failed => Vec::new(),
            ConnectionState::Connecting | ConnectionState::Open | ConnectionState::Retrying => {
                let mut actions = Vec::new();
                if self.pending_retry.take().is_some() {
                    actions.push(ConnectionAction::CancelRetry);
                }
                actions.push(ConnectionAction::CloseTransport);
                self.state = ConnectionState::Disconnected;
                self.retry_count = 0;
                self.attempt_in_flight = false;
                self.address = None;
                self.clear_tokens();
                actions
            }
        }
    }

    fn open_succeeded(&mut self, recovered: bool) -> Vec<ConnectionAction> {
        self.state = ConnectionState::Open;
        self.retry_count = 0;
        self.pending_retry = None;
        self.attempt_in_flight = false;

        let mut actions = vec![ConnectionAction::NotifyConnected];
        if recovered {
            actions.push(ConnectionAction::NotifyRetry(RetrySignal::Recovered));
        }
        if let Some(sync_token) = self.resync_token.clone() {
            actions.push(ConnectionAction::SendCommand(ClientMessage::Resync {
                sync_token,
            }));
        }
        actions
    }

    fn schedule_retry(&mut self) -> Vec<ConnectionAction> {
        if self.pending_retry.is_some() {
            return Vec::new();
        }
        if self.retry_count >= self.policy.max_attempts {
            return self.fail_terminally();
        }
        self.retry_count += 1;
        self.pending_retry = Some(self.retry_count);
        vec![
            ConnectionAction::ScheduleRetry {
                attempt: self.retry_count,
                delay: self.policy.delay,
            },
            ConnectionAction::NotifyRetry(RetrySignal::Attempt(self.retry_count)),
        ]
    }

    fn fail_terminally(&mut self) -> Vec<ConnectionAction> {
        tracing::error!(
            attempts = self.retry_count,
            "Retry budget exhausted, giving up on the session"
        );
        self.state = ConnectionState::Failed;
        self.pending_retry = None;
        self.attempt_in_flight = false;
        self.clear_tokens();
        vec![ConnectionAction::RunCleanup]
    }

    fn clear_tokens(&mut self) {
        self.session_token = None;
        self.resync_token = None;
    }
}
