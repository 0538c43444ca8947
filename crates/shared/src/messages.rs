//! Message types exchanged between the backend and the player client.
//!
//! Both directions are closed tagged unions keyed by the JSON `type` field.
//! Inbound messages arrive on the persistent stream or as the reply to a
//! posted command. Outbound commands are posted to the action endpoint.
//!
//! ## Versioning Policy
//!
//! - New variants can be added at the end (forward compatible)
//! - Removing variants requires major version bump
//! - Renaming variants is a breaking change
//! - Unknown message kinds deserialize to `Unknown` and are ignored by dispatch

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use satchel_domain::{
    GameId, GameInfo, Inventory, ItemId, ItemInstance, ItemPrefab, ItemRarity, LootId, LootState,
    PlayerId, PrefabId,
};

// =============================================================================
// Server Messages (Backend → Player)
// =============================================================================

/// Messages from the backend to the player client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full snapshot (when `game` is set) or a partial catalog refresh
    GameInfo { msg: GameInfoPayload },
    /// One item was added to or changed in one inventory
    InventoryUpdate { msg: InventoryUpdate },
    /// One player's gold changed
    GoldUpdate { msg: GoldUpdate },
    /// One item left one inventory
    ItemRemoval { msg: ItemRemoval },
    /// Whole loot pool replacement
    #[serde(rename = "loot_list_update")]
    LootUpdate { msg: LootState },
    /// A command was rejected; human readable
    Error { msg: String },
    /// Informational notice; human readable
    Notification { msg: String },
    /// Handshake: `registration_token` answers a create/join request,
    /// `token` arrives on the stream once the channel is registered
    Register {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        registration_token: Option<String>,
    },
    /// Stream position marker used to resume after a reconnect
    SyncToken { sync_token: String },
    /// Reply to an item import
    ItemsImported { success: bool },
    /// Whether players may currently sell items
    SellingToggled { msg: bool },
    /// Unknown message kind for forward compatibility
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ServerMessage::GameInfo { .. } => MessageKind::GameInfo,
            ServerMessage::InventoryUpdate { .. } => MessageKind::InventoryUpdate,
            ServerMessage::GoldUpdate { .. } => MessageKind::GoldUpdate,
            ServerMessage::ItemRemoval { .. } => MessageKind::ItemRemoval,
            ServerMessage::LootUpdate { .. } => MessageKind::LootUpdate,
            ServerMessage::Error { .. } => MessageKind::Error,
            ServerMessage::Notification { .. } => MessageKind::Notification,
            ServerMessage::Register { .. } => MessageKind::Register,
            ServerMessage::SyncToken { .. } => MessageKind::SyncToken,
            ServerMessage::ItemsImported { .. } => MessageKind::ItemsImported,
            ServerMessage::SellingToggled { .. } => MessageKind::SellingToggled,
            ServerMessage::Unknown => MessageKind::Unknown,
        }
    }
}

/// Discriminant of [`ServerMessage`], used as the dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageKind {
    GameInfo,
    InventoryUpdate,
    GoldUpdate,
    ItemRemoval,
    LootUpdate,
    Error,
    Notification,
    Register,
    SyncToken,
    ItemsImported,
    SellingToggled,
    Unknown,
}

impl MessageKind {
    pub const ALL: [MessageKind; 12] = [
        Self::GameInfo,
        Self::InventoryUpdate,
        Self::GoldUpdate,
        Self::ItemRemoval,
        Self::LootUpdate,
        Self::Error,
        Self::Notification,
        Self::Register,
        Self::SyncToken,
        Self::ItemsImported,
        Self::SellingToggled,
        Self::Unknown,
    ];

    /// Wire name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GameInfo => "game_info",
            Self::InventoryUpdate => "inventory_update",
            Self::GoldUpdate => "gold_update",
            Self::ItemRemoval => "item_removal",
            Self::LootUpdate => "loot_list_update",
            Self::Error => "error",
            Self::Notification => "notification",
            Self::Register => "register",
            Self::SyncToken => "sync_token",
            Self::ItemsImported => "items_imported",
            Self::SellingToggled => "selling_toggled",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a `game_info` message. Every field is optional: the catalog is
/// sent on its own, and a DM snapshot carries `inventories` where a player
/// snapshot carries `inventory`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GameInfoPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<GameInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<PlayerId>,
    #[serde(rename = "isDM", default, skip_serializing_if = "Option::is_none")]
    pub is_dm: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<BTreeMap<ItemId, ItemInstance>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventories: Option<BTreeMap<PlayerId, Inventory>>,
    #[serde(rename = "itemlist", default, skip_serializing_if = "Option::is_none")]
    pub item_catalog: Option<Vec<ItemPrefab>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loot: Option<LootState>,
}

impl GameInfoPayload {
    /// A payload carrying the game replaces the whole local state.
    pub fn is_full_snapshot(&self) -> bool {
        self.game.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryUpdate {
    #[serde(rename = "playerid")]
    pub player_id: PlayerId,
    #[serde(rename = "itemid")]
    pub item_id: ItemId,
    pub item: ItemInstance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldUpdate {
    #[serde(rename = "playerid")]
    pub player_id: PlayerId,
    pub gold: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRemoval {
    #[serde(rename = "playerid")]
    pub player_id: PlayerId,
    #[serde(rename = "itemid")]
    pub item_id: ItemId,
}

// =============================================================================
// Client Messages (Player → Backend)
// =============================================================================

/// Commands from the player client to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Create or join a session; answered with a `register` reply
    #[serde(rename = "register")]
    Register {
        action: RegisterAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        join: Option<JoinSessionData>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        create: Option<CreateSessionData>,
    },
    /// Pick who this client plays as (the DM uses [`PlayerId::DUNGEON_MASTER`])
    #[serde(rename = "selectPlayer")]
    SelectPlayer {
        #[serde(rename = "playerid")]
        player_id: PlayerId,
        #[serde(rename = "gameid")]
        game_id: GameId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dm_pass: Option<String>,
    },
    /// Ask for a full snapshot
    GetGameInfo,
    /// Resume the stream after a reconnect
    Resync { sync_token: String },
    CreatePlayer { player_name: String, gold: u64 },
    SetPlayerGold { player_id: PlayerId, gold: u64 },
    DeleteItem { item_id: ItemId },
    /// Give a new instance of a catalog entry to a player
    GiveItem { player_id: PlayerId, item_id: PrefabId },
    /// Hand an owned item to another player
    SendItem { player_id: PlayerId, item_id: ItemId },
    SellItem { item_id: ItemId },
    ToggleSelling,
    ImportNewItems { items: Vec<ItemPrefab> },
    GenerateLootItems { count_list: LootCounts },
    DistributeLoot { players: Vec<PlayerId> },
    AddLootItem { item_id: PrefabId },
    RemoveLootItem { loot_id: LootId },
    SetLootGold { loot_gold: u64 },
    ClaimLootItem { loot_id: LootId },
    VoteLootItem { loot_id: LootId, player_id: PlayerId },
    /// Signal that this participant is done with the current phase
    EndLootPhase,
    /// Empty the pool; aborts a running distribution
    ClearLoot,
    /// Unknown command kind for forward compatibility
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    pub fn join_session(code: impl Into<String>) -> Self {
        ClientMessage::Register {
            action: RegisterAction::JoinSession,
            join: Some(JoinSessionData { code: code.into() }),
            create: None,
        }
    }

    pub fn create_session(
        name: impl Into<String>,
        description: impl Into<String>,
        dm_pass: impl Into<String>,
    ) -> Self {
        ClientMessage::Register {
            action: RegisterAction::CreateSession,
            join: None,
            create: Some(CreateSessionData {
                name: name.into(),
                description: description.into(),
                dm_pass: dm_pass.into(),
            }),
        }
    }

    /// Wire name of the command, for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            ClientMessage::Register { .. } => "register",
            ClientMessage::SelectPlayer { .. } => "selectPlayer",
            ClientMessage::GetGameInfo => "GetGameInfo",
            ClientMessage::Resync { .. } => "Resync",
            ClientMessage::CreatePlayer { .. } => "CreatePlayer",
            ClientMessage::SetPlayerGold { .. } => "SetPlayerGold",
            ClientMessage::DeleteItem { .. } => "DeleteItem",
            ClientMessage::GiveItem { .. } => "GiveItem",
            ClientMessage::SendItem { .. } => "SendItem",
            ClientMessage::SellItem { .. } => "SellItem",
            ClientMessage::ToggleSelling => "ToggleSelling",
            ClientMessage::ImportNewItems { .. } => "ImportNewItems",
            ClientMessage::GenerateLootItems { .. } => "GenerateLootItems",
            ClientMessage::DistributeLoot { .. } => "DistributeLoot",
            ClientMessage::AddLootItem { .. } => "AddLootItem",
            ClientMessage::RemoveLootItem { .. } => "RemoveLootItem",
            ClientMessage::SetLootGold { .. } => "SetLootGold",
            ClientMessage::ClaimLootItem { .. } => "ClaimLootItem",
            ClientMessage::VoteLootItem { .. } => "VoteLootItem",
            ClientMessage::EndLootPhase => "EndLootPhase",
            ClientMessage::ClearLoot => "ClearLoot",
            ClientMessage::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegisterAction {
    #[serde(rename = "joinSession")]
    JoinSession,
    #[serde(rename = "createSession")]
    CreateSession,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSessionData {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionData {
    pub name: String,
    pub description: String,
    pub dm_pass: String,
}

/// How many items of each rarity to generate into the loot pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LootCounts {
    #[serde(default)]
    pub common: u32,
    #[serde(default)]
    pub uncommon: u32,
    #[serde(default)]
    pub rare: u32,
    #[serde(default)]
    pub very_rare: u32,
    #[serde(default)]
    pub epic: u32,
    #[serde(default)]
    pub legendary: u32,
}

impl LootCounts {
    /// Builder: set the count for one rarity. Rarities the generator does not
    /// roll (mundane, quest items) are ignored.
    pub fn with(mut self, rarity: ItemRarity, count: u32) -> Self {
        match rarity {
            ItemRarity::Common => self.common = count,
            ItemRarity::Uncommon => self.uncommon = count,
            ItemRarity::Rare => self.rare = count,
            ItemRarity::VeryRare => self.very_rare = count,
            ItemRarity::Epic => self.epic = count,
            ItemRarity::Legendary => self.legendary = count,
            ItemRarity::Mundane | ItemRarity::QuestItem | ItemRarity::Unknown => {}
        }
        self
    }

    pub fn total(&self) -> u32 {
        self.common + self.uncommon + self.rare + self.very_rare + self.epic + self.legendary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satchel_domain::LootPhase;
    use serde_json::json;

    #[test]
    fn parses_dm_snapshot() {
        let raw = json!({
            "type": "game_info",
            "msg": {
                "game": {
                    "game": {"id": 1, "name": "Crypt", "join_code": "ABCD"},
                    "players": [{"id": 2, "name": "Bram", "gold": 10}]
                },
                "player": -1,
                "isDM": true,
                "inventory": null,
                "inventories": {
                    "2": {"id": 2, "name": "Bram", "gold": 10, "inventory": {}}
                }
            }
        });

        let message: ServerMessage = serde_json::from_value(raw).expect("parse");
        let ServerMessage::GameInfo { msg } = message else {
            panic!("expected game_info");
        };
        assert!(msg.is_full_snapshot());
        assert_eq!(msg.is_dm, Some(true));
        assert!(msg.inventory.is_none());
        assert_eq!(msg.inventories.map(|i| i.len()), Some(1));
    }

    #[test]
    fn catalog_only_payload_is_partial() {
        let raw = json!({
            "type": "game_info",
            "msg": {"itemlist": [{"id": 1, "name": "Torch", "rarity": 0, "type": 3, "value": 1}]}
        });
        let message: ServerMessage = serde_json::from_value(raw).expect("parse");
        let ServerMessage::GameInfo { msg } = message else {
            panic!("expected game_info");
        };
        assert!(!msg.is_full_snapshot());
        assert_eq!(msg.item_catalog.map(|c| c.len()), Some(1));
    }

    #[test]
    fn parses_narrow_updates() {
        let gold: ServerMessage =
            serde_json::from_value(json!({"type": "gold_update", "msg": {"playerid": 2, "gold": 150}}))
                .expect("gold");
        assert_eq!(gold.kind(), MessageKind::GoldUpdate);

        let removal: ServerMessage = serde_json::from_value(
            json!({"type": "item_removal", "msg": {"playerid": 2, "itemid": 7}}),
        )
        .expect("removal");
        assert_eq!(
            removal,
            ServerMessage::ItemRemoval {
                msg: ItemRemoval {
                    player_id: PlayerId::new(2),
                    item_id: ItemId::new(7),
                }
            }
        );
    }

    #[test]
    fn parses_loot_update() {
        let raw = json!({
            "type": "loot_list_update",
            "msg": {
                "phase": 1,
                "items": {"4": {"lootid": 4, "id": 40, "name": "Ruby", "rarity": 3, "type": 7, "value": 250}},
                "gold": 30,
                "participants": [1, 2],
                "ready": []
            }
        });
        let message: ServerMessage = serde_json::from_value(raw).expect("parse");
        let ServerMessage::LootUpdate { msg } = message else {
            panic!("expected loot update");
        };
        assert_eq!(msg.phase, LootPhase::Claiming);
        assert_eq!(msg.items.len(), 1);
        assert_eq!(msg.gold, 30);
    }

    #[test]
    fn unknown_kind_is_tolerated() {
        let message: ServerMessage =
            serde_json::from_value(json!({"type": "weather_report", "msg": "rain"})).expect("parse");
        assert_eq!(message, ServerMessage::Unknown);
        assert_eq!(message.kind(), MessageKind::Unknown);
    }

    #[test]
    fn register_variants() {
        let reply: ServerMessage =
            serde_json::from_value(json!({"type": "register", "registration_token": "abc"}))
                .expect("reply");
        assert_eq!(
            reply,
            ServerMessage::Register {
                token: None,
                registration_token: Some("abc".into()),
            }
        );
    }

    #[test]
    fn command_wire_shapes() {
        assert_eq!(
            serde_json::to_value(ClientMessage::join_session("WXYZ")).expect("ser"),
            json!({"type": "register", "action": "joinSession", "join": {"code": "WXYZ"}})
        );
        assert_eq!(
            serde_json::to_value(ClientMessage::SelectPlayer {
                player_id: PlayerId::DUNGEON_MASTER,
                game_id: GameId::new(1),
                dm_pass: Some("secret".into()),
            })
            .expect("ser"),
            json!({"type": "selectPlayer", "playerid": -1, "gameid": 1, "dm_pass": "secret"})
        );
        assert_eq!(
            serde_json::to_value(ClientMessage::GetGameInfo).expect("ser"),
            json!({"type": "GetGameInfo"})
        );
        assert_eq!(
            serde_json::to_value(ClientMessage::GenerateLootItems {
                count_list: LootCounts::default().with(ItemRarity::VeryRare, 2),
            })
            .expect("ser"),
            json!({
                "type": "GenerateLootItems",
                "count_list": {"common": 0, "uncommon": 0, "rare": 0, "veryRare": 2, "epic": 0, "legendary": 0}
            })
        );
        assert_eq!(
            serde_json::to_value(ClientMessage::VoteLootItem {
                loot_id: LootId::new(4),
                player_id: PlayerId::new(2),
            })
            .expect("ser"),
            json!({"type": "VoteLootItem", "loot_id": 4, "player_id": 2})
        );
    }

    #[test]
    fn type_name_matches_wire_tag() {
        let commands = [
            ClientMessage::join_session("A"),
            ClientMessage::GetGameInfo,
            ClientMessage::SetPlayerGold {
                player_id: PlayerId::new(1),
                gold: 3,
            },
            ClientMessage::EndLootPhase,
            ClientMessage::ClearLoot,
        ];
        for command in commands {
            let value = serde_json::to_value(&command).expect("ser");
            assert_eq!(value["type"], command.type_name());
        }
    }

    #[test]
    fn kind_names_match_wire_tags() {
        let message = ServerMessage::Notification { msg: "hi".into() };
        let value = serde_json::to_value(&message).expect("ser");
        assert_eq!(value["type"], message.kind().as_str());

        let message = ServerMessage::LootUpdate {
            msg: LootState::default(),
        };
        let value = serde_json::to_value(&message).expect("ser");
        assert_eq!(value["type"], message.kind().as_str());
    }
}
