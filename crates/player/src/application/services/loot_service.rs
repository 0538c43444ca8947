//! Loot Service - drives a loot distribution round from this client
//!
//! Commands are validated by [`LootPhaseMachine`] against the latest match
//! state. The pending vote target is the only state kept here; it is
//! re-checked against the pool before every operation so a round that moved
//! on (or was aborted) never leaves a stale prompt open.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use satchel_domain::{LootId, PlayerId, PrefabId};
use satchel_shared::{ClientMessage, LootCounts};
use tokio::sync::watch;

use crate::application::error::SessionError;
use crate::infrastructure::messaging::CommandBus;
use crate::state::{LootPhaseMachine, MatchState};

pub struct LootService {
    commands: CommandBus,
    match_state: watch::Receiver<Arc<MatchState>>,
    machine: Mutex<LootPhaseMachine>,
}

impl LootService {
    pub fn new(commands: CommandBus, match_state: watch::Receiver<Arc<MatchState>>) -> Self {
        Self {
            commands,
            match_state,
            machine: Mutex::new(LootPhaseMachine::new()),
        }
    }

    /// Latest state, with the vote target re-checked against its pool.
    fn observed(&self) -> (Arc<MatchState>, MutexGuard<'_, LootPhaseMachine>) {
        let state = Arc::clone(&self.match_state.borrow());
        let mut machine = self.machine.lock().unwrap_or_else(PoisonError::into_inner);
        machine.observe(&state.loot);
        (state, machine)
    }

    /// Latest state for builders that never touch the vote target.
    fn latest(&self) -> Arc<MatchState> {
        let (state, machine) = self.observed();
        drop(machine);
        state
    }

    fn post(&self, command: ClientMessage) -> Result<(), SessionError> {
        tracing::debug!(command = command.type_name(), "Posting loot command");
        self.commands.send(command)?;
        Ok(())
    }

    pub fn generate(&self, counts: LootCounts) -> Result<(), SessionError> {
        let state = self.latest();
        self.post(LootPhaseMachine::generate(&state, counts)?)
    }

    pub fn add_item(&self, prefab: PrefabId) -> Result<(), SessionError> {
        let state = self.latest();
        self.post(LootPhaseMachine::add_item(&state, prefab)?)
    }

    pub fn remove_item(&self, loot_id: LootId) -> Result<(), SessionError> {
        let state = self.latest();
        self.post(LootPhaseMachine::remove_item(&state, loot_id)?)
    }

    pub fn set_gold(&self, gold: u64) -> Result<(), SessionError> {
        let state = self.latest();
        self.post(LootPhaseMachine::set_gold(&state, gold)?)
    }

    /// Start a round with `participants`; moves the pool to Claiming once
    /// the backend accepts.
    pub fn distribute(&self, participants: &[PlayerId]) -> Result<(), SessionError> {
        let state = self.latest();
        self.post(LootPhaseMachine::distribute(&state, participants)?)
    }

    /// Empty the pool; aborts a running round.
    pub fn clear(&self) -> Result<(), SessionError> {
        let (state, mut machine) = self.observed();
        let command = LootPhaseMachine::clear(&state)?;
        machine.cancel_vote_target();
        drop(machine);
        self.post(command)
    }

    pub fn claim(&self, loot_id: LootId) -> Result<(), SessionError> {
        let state = self.latest();
        self.post(LootPhaseMachine::claim(&state, loot_id)?)
    }

    pub fn end_phase(&self) -> Result<(), SessionError> {
        let state = self.latest();
        self.post(LootPhaseMachine::end_phase(&state)?)
    }

    pub fn vote_target(&self) -> Option<LootId> {
        let (_, machine) = self.observed();
        machine.vote_target()
    }

    pub fn select_vote_target(&self, loot_id: LootId) -> Result<(), SessionError> {
        let (state, mut machine) = self.observed();
        machine.select_vote_target(&state, loot_id)?;
        Ok(())
    }

    pub fn cancel_vote_target(&self) {
        let (_, mut machine) = self.observed();
        machine.cancel_vote_target();
    }

    /// Vote for `chosen` to receive the selected item.
    pub fn cast_vote(&self, chosen: PlayerId) -> Result<(), SessionError> {
        let (state, mut machine) = self.observed();
        let command = machine.cast_vote(&state, chosen)?;
        drop(machine);
        self.post(command)
    }
}
