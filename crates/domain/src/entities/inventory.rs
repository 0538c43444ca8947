//! A player's inventory: gold plus the item instances they own.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use satchel_domain::{ItemId, PlayerId};

use super::item::ItemInstance;

/// Inventory as the backend sends it (`{id, name, gold, inventory: {...}}`).
///
/// Mutators take `self` by value and return the updated inventory so callers
/// build replacement values instead of editing shared ones in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(rename = "id")]
    pub player_id: PlayerId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub gold: u64,
    #[serde(rename = "inventory", default)]
    pub items: BTreeMap<ItemId, ItemInstance>,
}

impl Inventory {
    pub fn new(player_id: PlayerId, name: impl Into<String>, gold: u64) -> Self {
        Self {
            player_id,
            name: name.into(),
            gold,
            items: BTreeMap::new(),
        }
    }

    pub fn with_item(mut self, item_id: ItemId, item: ItemInstance) -> Self {
        self.items.insert(item_id, item);
        self
    }

    pub fn without_item(mut self, item_id: ItemId) -> Self {
        self.items.remove(&item_id);
        self
    }

    pub fn with_gold(mut self, gold: u64) -> Self {
        self.gold = gold;
        self
    }

    /// Sum of every item's display value.
    pub fn total_value(&self) -> u64 {
        self.items.values().map(ItemInstance::display_value).sum()
    }
}
