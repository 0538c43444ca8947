//! Item prefabs (catalog entries) and item instances (owned copies).
//!
//! Rarity and type travel over the wire as integers. Unrecognized values map
//! to `Unknown` so a newer backend cannot break catalog parsing.

use serde::{Deserialize, Serialize};

use satchel_domain::{ItemId, PrefabId};

use crate::error::DomainError;

/// Ordered rarity ladder, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ItemRarity {
    Mundane,
    Common,
    Uncommon,
    Rare,
    VeryRare,
    Epic,
    Legendary,
    QuestItem,
    /// Unknown rarity for forward compatibility
    Unknown,
}

impl ItemRarity {
    pub const ALL: [ItemRarity; 8] = [
        Self::Mundane,
        Self::Common,
        Self::Uncommon,
        Self::Rare,
        Self::VeryRare,
        Self::Epic,
        Self::Legendary,
        Self::QuestItem,
    ];

    pub fn as_i64(self) -> i64 {
        match self {
            Self::Mundane => 0,
            Self::Common => 1,
            Self::Uncommon => 2,
            Self::Rare => 3,
            Self::VeryRare => 4,
            Self::Epic => 5,
            Self::Legendary => 6,
            Self::QuestItem => 7,
            Self::Unknown => -1,
        }
    }
}

impl From<i64> for ItemRarity {
    fn from(value: i64) -> Self {
        match value {
            0 => Self::Mundane,
            1 => Self::Common,
            2 => Self::Uncommon,
            3 => Self::Rare,
            4 => Self::VeryRare,
            5 => Self::Epic,
            6 => Self::Legendary,
            7 => Self::QuestItem,
            _ => Self::Unknown,
        }
    }
}

impl From<ItemRarity> for i64 {
    fn from(value: ItemRarity) -> Self {
        value.as_i64()
    }
}

impl std::fmt::Display for ItemRarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mundane => write!(f, "Mundane"),
            Self::Common => write!(f, "Common"),
            Self::Uncommon => write!(f, "Uncommon"),
            Self::Rare => write!(f, "Rare"),
            Self::VeryRare => write!(f, "Very Rare"),
            Self::Epic => write!(f, "Epic"),
            Self::Legendary => write!(f, "Legendary"),
            Self::QuestItem => write!(f, "Quest Item"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

impl std::str::FromStr for ItemRarity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace([' ', '_'], "").as_str() {
            "mundane" => Ok(Self::Mundane),
            "common" => Ok(Self::Common),
            "uncommon" => Ok(Self::Uncommon),
            "rare" => Ok(Self::Rare),
            "veryrare" => Ok(Self::VeryRare),
            "epic" => Ok(Self::Epic),
            "legendary" => Ok(Self::Legendary),
            "questitem" => Ok(Self::QuestItem),
            _ => Err(DomainError::parse(format!("Unknown item rarity: {s}"))),
        }
    }
}

/// Item category as numbered by the backend (starting at 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ItemType {
    Weapon,
    Armor,
    AdventureGear,
    Tool,
    Consumable,
    MagicalItem,
    Valuable,
    Scroll,
    Shield,
    Ring,
    Staff,
    Misc,
    Wondrous,
    /// Unknown type for forward compatibility
    Unknown,
}

impl ItemType {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Weapon => 1,
            Self::Armor => 2,
            Self::AdventureGear => 3,
            Self::Tool => 4,
            Self::Consumable => 5,
            Self::MagicalItem => 6,
            Self::Valuable => 7,
            Self::Scroll => 8,
            Self::Shield => 9,
            Self::Ring => 10,
            Self::Staff => 11,
            Self::Misc => 12,
            Self::Wondrous => 13,
            Self::Unknown => 0,
        }
    }
}

impl From<i64> for ItemType {
    fn from(value: i64) -> Self {
        match value {
            1 => Self::Weapon,
            2 => Self::Armor,
            3 => Self::AdventureGear,
            4 => Self::Tool,
            5 => Self::Consumable,
            6 => Self::MagicalItem,
            7 => Self::Valuable,
            8 => Self::Scroll,
            9 => Self::Shield,
            10 => Self::Ring,
            11 => Self::Staff,
            12 => Self::Misc,
            13 => Self::Wondrous,
            _ => Self::Unknown,
        }
    }
}

impl From<ItemType> for i64 {
    fn from(value: ItemType) -> Self {
        value.as_i64()
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Weapon => write!(f, "Weapon"),
            Self::Armor => write!(f, "Armor"),
            Self::AdventureGear => write!(f, "Adventure Gear"),
            Self::Tool => write!(f, "Tool"),
            Self::Consumable => write!(f, "Consumable"),
            Self::MagicalItem => write!(f, "Magical Item"),
            Self::Valuable => write!(f, "Valuable"),
            Self::Scroll => write!(f, "Scroll"),
            Self::Shield => write!(f, "Shield"),
            Self::Ring => write!(f, "Ring"),
            Self::Staff => write!(f, "Staff"),
            Self::Misc => write!(f, "Misc"),
            Self::Wondrous => write!(f, "Wondrous"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

fn default_count() -> u32 {
    1
}

/// A catalog entry that instances are created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPrefab {
    pub id: PrefabId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "img", default)]
    pub image: String,
    pub rarity: ItemRarity,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    #[serde(default)]
    pub value: u32,
    #[serde(default)]
    pub stackable: bool,
    #[serde(default)]
    pub unique: bool,
}

/// An item owned by a player (or sitting in the loot pool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInstance {
    pub id: ItemId,
    /// Catalog entry this instance was created from, when known
    #[serde(rename = "id_prefab", default, skip_serializing_if = "Option::is_none")]
    pub prefab_id: Option<PrefabId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "img", default)]
    pub image: String,
    pub rarity: ItemRarity,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    #[serde(default)]
    pub value: u32,
    #[serde(default = "default_count")]
    pub count: u32,
}

impl ItemInstance {
    /// Create a single instance of a prefab.
    pub fn from_prefab(id: ItemId, prefab: &ItemPrefab) -> Self {
        Self {
            id,
            prefab_id: Some(prefab.id),
            name: prefab.name.clone(),
            description: prefab.description.clone(),
            image: prefab.image.clone(),
            rarity: prefab.rarity,
            item_type: prefab.item_type,
            value: prefab.value,
            count: 1,
        }
    }

    /// Value shown in inventories: unit value times stack size.
    pub fn display_value(&self) -> u64 {
        u64::from(self.value) * u64::from(self.count)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.count == 0 {
            return Err(DomainError::validation(format!(
                "Item {} has a count of zero",
                self.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sword() -> ItemInstance {
        ItemInstance {
            id: ItemId::new(7),
            prefab_id: Some(PrefabId::new(2)),
            name: "Longsword".into(),
            description: "Sharp".into(),
            image: "sword.png".into(),
            rarity: ItemRarity::Common,
            item_type: ItemType::Weapon,
            value: 15,
            count: 3,
        }
    }

    #[test]
    fn display_value_multiplies_count() {
        assert_eq!(sword().display_value(), 45);
    }

    #[test]
    fn rarity_is_ordered() {
        assert!(ItemRarity::Mundane < ItemRarity::Common);
        assert!(ItemRarity::Epic < ItemRarity::Legendary);
        assert!(ItemRarity::Legendary < ItemRarity::QuestItem);
    }

    #[test]
    fn rarity_parses_display_names() {
        for rarity in ItemRarity::ALL {
            assert_eq!(rarity.to_string().parse::<ItemRarity>(), Ok(rarity));
        }
        assert!("shiny".parse::<ItemRarity>().is_err());
    }

    #[test]
    fn instance_parses_backend_shape() {
        let json = r#"{
            "id": 7, "id_prefab": 2, "name": "Longsword", "rarity": 1, "type": 1,
            "description": "Sharp", "value": 15, "img": "sword.png"
        }"#;
        let item: ItemInstance = serde_json::from_str(json).expect("parse");

        assert_eq!(item.count, 1);
        assert_eq!(item.rarity, ItemRarity::Common);
        assert_eq!(item.item_type, ItemType::Weapon);
        assert_eq!(item.image, "sword.png");
    }

    #[test]
    fn unknown_wire_values_fall_back() {
        let json = r#"{"id": 1, "name": "Odd", "rarity": 42, "type": 99}"#;
        let item: ItemInstance = serde_json::from_str(json).expect("parse");

        assert_eq!(item.rarity, ItemRarity::Unknown);
        assert_eq!(item.item_type, ItemType::Unknown);
    }

    #[test]
    fn zero_count_is_invalid() {
        let mut item = sword();
        item.count = 0;
        assert!(item.validate().is_err());
    }
}
