//! Domain entities

pub mod game;
pub mod inventory;
pub mod item;
pub mod loot;

pub use game::{GameInfo, GameSummary, PlayerSummary};
pub use inventory::Inventory;
pub use item::{ItemInstance, ItemPrefab, ItemRarity, ItemType};
pub use loot::{LootItem, LootPhase, LootState};
