//! Loot pool state shared by every participant of a distribution round.
//!
//! # Phases
//!
//! ```text
//! Idle(0) --distribute--> Claiming(1) --all ready--> Voting(2) --settled--> Idle(0)
//!    ^                         |                         |
//!    +--------- abort ---------+------------ abort ------+
//! ```
//!
//! Phases are only ever changed by the backend. This module validates the
//! membership invariants of a received state; it never advances `phase`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use satchel_domain::{LootId, PlayerId};

use super::item::ItemInstance;
use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LootPhase {
    /// No distribution running
    #[default]
    Idle,
    /// Participants claim the items they want
    Claiming,
    /// Participants vote on who receives contested items
    Voting,
}

impl LootPhase {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Claiming => 1,
            Self::Voting => 2,
        }
    }

    pub fn is_active(self) -> bool {
        self != Self::Idle
    }

    /// Whether the backend moving from `self` to `next` follows the normal
    /// round order. Aborts (any phase back to Idle) count as expected.
    pub fn is_expected_transition(self, next: LootPhase) -> bool {
        self == next
            || matches!(
                (self, next),
                (Self::Idle, Self::Claiming)
                    | (Self::Claiming, Self::Voting)
                    | (Self::Claiming, Self::Idle)
                    | (Self::Voting, Self::Idle)
            )
    }
}

impl TryFrom<u8> for LootPhase {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Idle),
            1 => Ok(Self::Claiming),
            2 => Ok(Self::Voting),
            other => Err(DomainError::parse(format!("Unknown loot phase: {other}"))),
        }
    }
}

impl From<LootPhase> for u8 {
    fn from(value: LootPhase) -> Self {
        value.as_u8()
    }
}

impl std::fmt::Display for LootPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Claiming => write!(f, "Claiming"),
            Self::Voting => write!(f, "Voting"),
        }
    }
}

/// An item in the loot pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootItem {
    #[serde(rename = "lootid")]
    pub loot_id: LootId,
    #[serde(flatten)]
    pub item: ItemInstance,
    /// Players who claimed this item during Claiming
    #[serde(default)]
    pub claims: BTreeSet<PlayerId>,
    /// Voter -> chosen recipient, during Voting
    #[serde(default)]
    pub votes: BTreeMap<PlayerId, PlayerId>,
}

impl LootItem {
    pub fn new(loot_id: LootId, item: ItemInstance) -> Self {
        Self {
            loot_id,
            item,
            claims: BTreeSet::new(),
            votes: BTreeMap::new(),
        }
    }

    pub fn is_claimed_by(&self, player: PlayerId) -> bool {
        self.claims.contains(&player)
    }

    /// Number of votes each candidate has received.
    pub fn tally(&self) -> BTreeMap<PlayerId, usize> {
        let mut tally = BTreeMap::new();
        for chosen in self.votes.values() {
            *tally.entry(*chosen).or_insert(0) += 1;
        }
        tally
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LootState {
    #[serde(default)]
    pub phase: LootPhase,
    #[serde(default)]
    pub items: BTreeMap<LootId, LootItem>,
    #[serde(default)]
    pub gold: u64,
    #[serde(default)]
    pub participants: BTreeSet<PlayerId>,
    #[serde(default)]
    pub ready: BTreeSet<PlayerId>,
}

impl LootState {
    pub fn is_participant(&self, player: PlayerId) -> bool {
        self.participants.contains(&player)
    }

    pub fn is_ready(&self, player: PlayerId) -> bool {
        self.ready.contains(&player)
    }

    /// True once every participant has signalled completion.
    pub fn all_ready(&self) -> bool {
        !self.participants.is_empty() && self.participants.is_subset(&self.ready)
    }

    pub fn item(&self, loot_id: LootId) -> Option<&LootItem> {
        self.items.get(&loot_id)
    }

    /// Check that `ready`, claims and votes only mention participants.
    pub fn validate(&self) -> Result<(), DomainError> {
        if let Some(outsider) = self.ready.difference(&self.participants).next() {
            return Err(DomainError::constraint(format!(
                "Player {outsider} is ready but not a loot participant"
            )));
        }
        for item in self.items.values() {
            if let Some(outsider) = item.claims.difference(&self.participants).next() {
                return Err(DomainError::constraint(format!(
                    "Player {outsider} claimed loot {} but is not a participant",
                    item.loot_id
                )));
            }
            for (voter, chosen) in &item.votes {
                if !self.is_participant(*voter) || !self.is_participant(*chosen) {
                    return Err(DomainError::constraint(format!(
                        "Vote {voter} -> {chosen} on loot {} involves a non-participant",
                        item.loot_id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Drop every ready mark, claim and vote that names a non-participant.
    ///
    /// Returns the cleaned state and how many entries were removed.
    pub fn sanitized(mut self) -> (LootState, usize) {
        let participants = self.participants.clone();
        let mut removed = 0;

        let before = self.ready.len();
        self.ready.retain(|player| participants.contains(player));
        removed += before - self.ready.len();

        for item in self.items.values_mut() {
            let before = item.claims.len();
            item.claims.retain(|player| participants.contains(player));
            removed += before - item.claims.len();

            let before = item.votes.len();
            item.votes
                .retain(|voter, chosen| participants.contains(voter) && participants.contains(chosen));
            removed += before - item.votes.len();
        }

        (self, removed)
    }
}
