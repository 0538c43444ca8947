//! Loot phase machine.
//!
//! Two halves:
//! - `reduce` folds a `loot_list_update` into the store. The phase is always
//!   taken from the backend; the client never advances it.
//! - The command builders check, against the current [`MatchState`], whether
//!   the viewer may issue a loot command right now, and build it.
//!
//! The only client-side state is the pending vote target: in Voting at most
//! one item at a time has an open "who gets this?" prompt.

use satchel_domain::{LootId, LootPhase, LootState, PlayerId, PrefabId};
use satchel_shared::{ClientMessage, LootCounts};
use thiserror::Error;

use super::match_state::MatchState;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LootError {
    #[error("Only the Dungeon Master can {0}")]
    NotDungeonMaster(&'static str),

    #[error("Loot action needs phase {expected}, but the pool is {actual}")]
    WrongPhase {
        expected: LootPhase,
        actual: LootPhase,
    },

    #[error("No loot distribution is running")]
    NoActiveDistribution,

    #[error("No player is selected on this client")]
    NoViewer,

    #[error("Player {0} is not a participant in this round")]
    NotParticipant(PlayerId),

    #[error("Player {0} has already finished this phase")]
    AlreadyReady(PlayerId),

    #[error("Loot item {0} is not in the pool")]
    UnknownLootItem(LootId),

    #[error("Loot item {0} is already claimed by this player")]
    AlreadyClaimed(LootId),

    #[error("Player {0} is not in this session")]
    UnknownPlayer(PlayerId),

    #[error("A distribution needs at least one participant")]
    NoParticipants,

    #[error("The loot pool is empty")]
    EmptyPool,

    #[error("Nothing to generate")]
    EmptyGeneration,

    #[error("No loot item is selected for voting")]
    NoVoteTarget,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LootPhaseMachine {
    vote_target: Option<LootId>,
}

impl LootPhaseMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an inbound loot update into the current pool.
    ///
    /// Membership entries naming non-participants are dropped so `ready`,
    /// claims and votes stay subsets of `participants`.
    pub fn reduce(current: &LootState, incoming: LootState) -> LootState {
        if !current.phase.is_expected_transition(incoming.phase) {
            tracing::warn!(
                from = %current.phase,
                to = %incoming.phase,
                "Unexpected loot phase transition from backend"
            );
        }
        let (clean, removed) = incoming.sanitized();
        if removed > 0 {
            tracing::warn!(removed, "Dropped loot entries for non-participants");
        }
        clean
    }

    pub fn vote_target(&self) -> Option<LootId> {
        self.vote_target
    }

    /// Re-check the pending vote target against a new pool.
    pub fn observe(&mut self, loot: &LootState) {
        if let Some(target) = self.vote_target {
            if loot.phase != LootPhase::Voting || loot.item(target).is_none() {
                self.vote_target = None;
            }
        }
    }

    // ---------------------------------------------------------------------
    // Dungeon Master commands
    // ---------------------------------------------------------------------

    pub fn generate(state: &MatchState, counts: LootCounts) -> Result<ClientMessage, LootError> {
        require_dm(state, "generate loot")?;
        require_phase(&state.loot, LootPhase::Idle)?;
        if counts.total() == 0 {
            return Err(LootError::EmptyGeneration);
        }
        Ok(ClientMessage::GenerateLootItems { count_list: counts })
    }

    pub fn add_item(state: &MatchState, prefab: PrefabId) -> Result<ClientMessage, LootError> {
        require_dm(state, "add loot")?;
        require_phase(&state.loot, LootPhase::Idle)?;
        Ok(ClientMessage::AddLootItem { item_id: prefab })
    }

    pub fn remove_item(state: &MatchState, loot_id: LootId) -> Result<ClientMessage, LootError> {
        require_dm(state, "remove loot")?;
        require_phase(&state.loot, LootPhase::Idle)?;
        if state.loot.item(loot_id).is_none() {
            return Err(LootError::UnknownLootItem(loot_id));
        }
        Ok(ClientMessage::RemoveLootItem { loot_id })
    }

    pub fn set_gold(state: &MatchState, gold: u64) -> Result<ClientMessage, LootError> {
        require_dm(state, "set loot gold")?;
        require_phase(&state.loot, LootPhase::Idle)?;
        Ok(ClientMessage::SetLootGold { loot_gold: gold })
    }

    pub fn distribute(
        state: &MatchState,
        participants: &[PlayerId],
    ) -> Result<ClientMessage, LootError> {
        require_dm(state, "distribute loot")?;
        require_phase(&state.loot, LootPhase::Idle)?;
        if participants.is_empty() {
            return Err(LootError::NoParticipants);
        }
        if state.loot.items.is_empty() && state.loot.gold == 0 {
            return Err(LootError::EmptyPool);
        }
        if let Some(unknown) = participants
            .iter()
            .find(|id| !state.inventories.contains_key(id))
        {
            return Err(LootError::UnknownPlayer(*unknown));
        }

        let mut players = participants.to_vec();
        players.sort_unstable();
        players.dedup();
        Ok(ClientMessage::DistributeLoot { players })
    }

    /// Empty the pool. From Claiming or Voting this aborts the round.
    pub fn clear(state: &MatchState) -> Result<ClientMessage, LootError> {
        require_dm(state, "clear loot")?;
        Ok(ClientMessage::ClearLoot)
    }

    // ---------------------------------------------------------------------
    // Participant commands
    // ---------------------------------------------------------------------

    pub fn claim(state: &MatchState, loot_id: LootId) -> Result<ClientMessage, LootError> {
        require_phase(&state.loot, LootPhase::Claiming)?;
        let viewer = require_active_participant(state)?;
        let item = state
            .loot
            .item(loot_id)
            .ok_or(LootError::UnknownLootItem(loot_id))?;
        if item.is_claimed_by(viewer) {
            return Err(LootError::AlreadyClaimed(loot_id));
        }
        Ok(ClientMessage::ClaimLootItem { loot_id })
    }

    /// Signal completion of the current phase (joins `ready`).
    pub fn end_phase(state: &MatchState) -> Result<ClientMessage, LootError> {
        if !state.loot.phase.is_active() {
            return Err(LootError::NoActiveDistribution);
        }
        require_active_participant(state)?;
        Ok(ClientMessage::EndLootPhase)
    }

    /// Open the vote prompt for one item, replacing any open prompt.
    pub fn select_vote_target(
        &mut self,
        state: &MatchState,
        loot_id: LootId,
    ) -> Result<(), LootError> {
        require_phase(&state.loot, LootPhase::Voting)?;
        require_active_participant(state)?;
        if state.loot.item(loot_id).is_none() {
            return Err(LootError::UnknownLootItem(loot_id));
        }
        self.vote_target = Some(loot_id);
        Ok(())
    }

    pub fn cancel_vote_target(&mut self) {
        self.vote_target = None;
    }

    /// Vote for `chosen` to receive the pending target; closes the prompt.
    pub fn cast_vote(
        &mut self,
        state: &MatchState,
        chosen: PlayerId,
    ) -> Result<ClientMessage, LootError> {
        let loot_id = self.vote_target.ok_or(LootError::NoVoteTarget)?;
        require_phase(&state.loot, LootPhase::Voting)?;
        require_active_participant(state)?;
        if state.loot.item(loot_id).is_none() {
            self.vote_target = None;
            return Err(LootError::UnknownLootItem(loot_id));
        }
        if !state.loot.is_participant(chosen) {
            return Err(LootError::NotParticipant(chosen));
        }
        self.vote_target = None;
        Ok(ClientMessage::VoteLootItem {
            loot_id,
            player_id: chosen,
        })
    }
}

fn require_dm(state: &MatchState, action: &'static str) -> Result<(), LootError> {
    if state.role.is_dungeon_master() {
        Ok(())
    } else {
        Err(LootError::NotDungeonMaster(action))
    }
}

fn require_phase(loot: &LootState, expected: LootPhase) -> Result<(), LootError> {
    if loot.phase == expected {
        Ok(())
    } else {
        Err(LootError::WrongPhase {
            expected,
            actual: loot.phase,
        })
    }
}

/// The viewer must be a participant who has not yet signalled ready.
fn require_active_participant(state: &MatchState) -> Result<PlayerId, LootError> {
    let viewer = state.current_player_id().ok_or(LootError::NoViewer)?;
    if !state.loot.is_participant(viewer) {
        return Err(LootError::NotParticipant(viewer));
    }
    if state.loot.is_ready(viewer) {
        return Err(LootError::AlreadyReady(viewer));
    }
    Ok(viewer)
}
