//! Satchel domain vocabulary: items, inventories, the session roster and the
//! loot pool, together with the invariants that hold for each.

extern crate self as satchel_domain;

pub mod entities;
pub mod error;
pub mod ids;

pub use entities::{
    GameInfo, GameSummary, Inventory, ItemInstance, ItemPrefab, ItemRarity, ItemType, LootItem,
    LootPhase, LootState, PlayerSummary,
};
pub use error::DomainError;
pub use ids::{GameId, ItemId, LootId, PlayerId, PrefabId};
