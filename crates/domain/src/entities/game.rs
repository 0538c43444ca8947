//! Session roster information.

use serde::{Deserialize, Serialize};

use satchel_domain::{GameId, PlayerId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSummary {
    pub id: GameId,
    pub name: String,
    #[serde(default)]
    pub join_code: String,
}

/// Roster entry for one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub id: PlayerId,
    pub name: String,
    #[serde(default)]
    pub gold: u64,
}

/// The game plus its roster, as carried by a full snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameInfo {
    pub game: GameSummary,
    #[serde(default)]
    pub players: Vec<PlayerSummary>,
}

impl GameInfo {
    pub fn player(&self, id: PlayerId) -> Option<&PlayerSummary> {
        self.players.iter().find(|player| player.id == id)
    }

    pub fn has_player(&self, id: PlayerId) -> bool {
        self.player(id).is_some()
    }

    /// Returns a copy with the roster gold for `id` replaced, or `None` when
    /// the player is not on the roster.
    pub fn with_player_gold(&self, id: PlayerId, gold: u64) -> Option<GameInfo> {
        let index = self.players.iter().position(|player| player.id == id)?;
        let mut updated = self.clone();
        updated.players[index].gold = gold;
        Some(updated)
    }
}
