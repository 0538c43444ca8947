//! Service layer error types

use satchel_domain::{ItemId, PlayerId, PrefabId};
use satchel_shared::MessageKind;
use thiserror::Error;

use crate::state::LootError;

/// Errors returned by the application services before or after a command
/// reaches the backend.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Not in a game yet")]
    NoGame,

    #[error("Only the Dungeon Master can {0}")]
    NotDungeonMaster(&'static str),

    #[error("No player is selected on this client")]
    NoViewer,

    #[error("Player {0} is not in this session")]
    UnknownPlayer(PlayerId),

    #[error("Item {0} is not in a visible inventory")]
    UnknownItem(ItemId),

    #[error("Catalog has no item {0}")]
    UnknownPrefab(PrefabId),

    #[error("Selling is currently disabled")]
    SellingDisabled,

    #[error("Invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("Backend rejected the command: {0}")]
    Rejected(String),

    #[error("Unexpected {kind} reply to {command}")]
    UnexpectedReply {
        command: &'static str,
        kind: MessageKind,
    },

    #[error(transparent)]
    Loot(#[from] LootError),

    /// The connection task is gone or the command could not be delivered
    #[error(transparent)]
    Bus(#[from] anyhow::Error),
}

impl SessionError {
    /// True when the failure was decided locally, before anything was sent.
    pub fn is_local(&self) -> bool {
        !matches!(
            self,
            SessionError::Rejected(_) | SessionError::UnexpectedReply { .. } | SessionError::Bus(_)
        )
    }
}
