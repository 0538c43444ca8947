//! Replicated match state.
//!
//! `MatchState` is the local mirror of the session. It is never edited in
//! place: the store swaps in a new value for every change, built either from
//! a full snapshot or by shallow-merging a [`MatchPatch`].

use std::collections::BTreeMap;
use std::sync::Arc;

use satchel_domain::{GameInfo, Inventory, ItemPrefab, LootState, PlayerId};
use satchel_shared::GameInfoPayload;

/// Who this client is viewing the session as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewerRole {
    #[default]
    None,
    DungeonMaster,
    Player(PlayerId),
}

impl ViewerRole {
    pub fn is_dungeon_master(self) -> bool {
        self == ViewerRole::DungeonMaster
    }

    pub fn player_id(self) -> Option<PlayerId> {
        match self {
            ViewerRole::Player(id) => Some(id),
            ViewerRole::None | ViewerRole::DungeonMaster => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchState {
    pub role: ViewerRole,
    pub current_game: Option<GameInfo>,
    /// DM view: every player. Player view: only the viewer.
    pub inventories: BTreeMap<PlayerId, Inventory>,
    pub item_catalog: Vec<ItemPrefab>,
    pub loot: LootState,
    pub selling_enabled: bool,
}

impl MatchState {
    pub fn current_player_id(&self) -> Option<PlayerId> {
        self.role.player_id()
    }

    /// The viewer's own inventory in the player view.
    pub fn own_inventory(&self) -> Option<&Inventory> {
        self.current_player_id()
            .and_then(|id| self.inventories.get(&id))
    }

    /// Build the state described by a full snapshot.
    ///
    /// The catalog and the loot pool travel in their own messages; when the
    /// snapshot does not carry them they are taken from `previous`.
    pub fn from_snapshot(previous: &MatchState, payload: GameInfoPayload) -> MatchState {
        let role = match (payload.is_dm, payload.player) {
            (Some(true), _) => ViewerRole::DungeonMaster,
            (_, Some(id)) if !id.is_dungeon_master() => ViewerRole::Player(id),
            _ => ViewerRole::None,
        };

        let inventories = match role {
            ViewerRole::DungeonMaster => payload.inventories.unwrap_or_default(),
            ViewerRole::Player(id) => match payload.inventory {
                Some(items) => {
                    let summary = payload.game.as_ref().and_then(|game| game.player(id));
                    let mut own = Inventory::new(
                        id,
                        summary.map(|p| p.name.clone()).unwrap_or_default(),
                        summary.map(|p| p.gold).unwrap_or_default(),
                    );
                    own.items = items;
                    BTreeMap::from([(id, own)])
                }
                None => BTreeMap::new(),
            },
            ViewerRole::None => BTreeMap::new(),
        };

        MatchState {
            role,
            current_game: payload.game,
            inventories,
            item_catalog: payload
                .item_catalog
                .unwrap_or_else(|| previous.item_catalog.clone()),
            loot: payload.loot.unwrap_or_else(|| previous.loot.clone()),
            selling_enabled: previous.selling_enabled,
        }
    }
}

/// Partial update: every `Some` field replaces that field wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchPatch {
    pub role: Option<ViewerRole>,
    pub current_game: Option<Option<GameInfo>>,
    pub inventories: Option<BTreeMap<PlayerId, Inventory>>,
    pub item_catalog: Option<Vec<ItemPrefab>>,
    pub loot: Option<LootState>,
    pub selling_enabled: Option<bool>,
}

impl MatchPatch {
    pub fn is_empty(&self) -> bool {
        *self == MatchPatch::default()
    }

    pub fn inventories(inventories: BTreeMap<PlayerId, Inventory>) -> Self {
        Self {
            inventories: Some(inventories),
            ..Self::default()
        }
    }

    pub fn loot(loot: LootState) -> Self {
        Self {
            loot: Some(loot),
            ..Self::default()
        }
    }
}

/// Holder of the current [`MatchState`] value.
///
/// Mutation goes through dispatcher handlers; readers get cheap `Arc`
/// snapshots that never change underneath them.
#[derive(Debug, Default)]
pub struct MatchStateStore {
    current: Arc<MatchState>,
    revision: u64,
}

impl MatchStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<MatchState> {
        Arc::clone(&self.current)
    }

    pub fn state(&self) -> &MatchState {
        &self.current
    }

    /// Incremented on every write; lets observers skip unchanged states.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Shallow merge: only the fields set in `patch` change.
    pub fn apply(&mut self, patch: MatchPatch) {
        if patch.is_empty() {
            return;
        }
        let current = self.state();
        let next = MatchState {
            role: patch.role.unwrap_or(current.role),
            current_game: patch
                .current_game
                .unwrap_or_else(|| current.current_game.clone()),
            inventories: patch
                .inventories
                .unwrap_or_else(|| current.inventories.clone()),
            item_catalog: patch
                .item_catalog
                .unwrap_or_else(|| current.item_catalog.clone()),
            loot: patch.loot.unwrap_or_else(|| current.loot.clone()),
            selling_enabled: patch.selling_enabled.unwrap_or(current.selling_enabled),
        };
        self.replace(next);
    }

    pub fn replace(&mut self, state: MatchState) {
        self.current = Arc::new(state);
        self.revision += 1;
    }

    /// Back to the empty initial value.
    pub fn reset(&mut self) {
        self.replace(MatchState::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satchel_domain::{GameId, GameSummary, ItemId, ItemInstance, ItemRarity, ItemType, PlayerSummary};

    fn game() -> GameInfo {
        GameInfo {
            game: GameSummary {
                id: GameId::new(1),
                name: "Crypt".into(),
                join_code: "ABCD".into(),
            },
            players: vec![PlayerSummary {
                id: PlayerId::new(2),
                name: "Bram".into(),
                gold: 40,
            }],
        }
    }

    fn torch() -> ItemInstance {
        ItemInstance {
            id: ItemId::new(5),
            prefab_id: None,
            name: "Torch".into(),
            description: String::new(),
            image: String::new(),
            rarity: ItemRarity::Mundane,
            item_type: ItemType::AdventureGear,
            value: 1,
            count: 1,
        }
    }

    #[test]
    fn patch_replaces_only_named_fields() {
        let mut store = MatchStateStore::new();
        store.apply(MatchPatch {
            role: Some(ViewerRole::DungeonMaster),
            current_game: Some(Some(game())),
            ..MatchPatch::default()
        });
        let before = store.snapshot();

        store.apply(MatchPatch {
            selling_enabled: Some(true),
            ..MatchPatch::default()
        });

        let after = store.snapshot();
        assert!(after.selling_enabled);
        assert_eq!(after.role, ViewerRole::DungeonMaster);
        assert_eq!(after.current_game, before.current_game);
        assert!(!before.selling_enabled, "earlier snapshots are immutable");
    }

    #[test]
    fn empty_patch_does_not_bump_revision() {
        let mut store = MatchStateStore::new();
        store.apply(MatchPatch::default());
        assert_eq!(store.revision(), 0);

        store.reset();
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn player_snapshot_builds_own_inventory_from_roster() {
        let payload = GameInfoPayload {
            game: Some(game()),
            player: Some(PlayerId::new(2)),
            is_dm: Some(false),
            inventory: Some(BTreeMap::from([(ItemId::new(5), torch())])),
            ..GameInfoPayload::default()
        };

        let state = MatchState::from_snapshot(&MatchState::default(), payload);

        assert_eq!(state.role, ViewerRole::Player(PlayerId::new(2)));
        let own = state.own_inventory().expect("own inventory");
        assert_eq!(own.gold, 40);
        assert_eq!(own.name, "Bram");
        assert_eq!(own.items.len(), 1);
    }

    #[test]
    fn dm_snapshot_keeps_catalog_when_absent() {
        let previous = MatchState {
            item_catalog: vec![ItemPrefab {
                id: satchel_domain::PrefabId::new(1),
                name: "Torch".into(),
                description: String::new(),
                image: String::new(),
                rarity: ItemRarity::Mundane,
                item_type: ItemType::AdventureGear,
                value: 1,
                stackable: true,
                unique: false,
            }],
            ..MatchState::default()
        };
        let payload = GameInfoPayload {
            game: Some(game()),
            player: Some(PlayerId::DUNGEON_MASTER),
            is_dm: Some(true),
            inventories: Some(BTreeMap::from([(
                PlayerId::new(2),
                Inventory::new(PlayerId::new(2), "Bram", 40),
            )])),
            ..GameInfoPayload::default()
        };

        let state = MatchState::from_snapshot(&previous, payload);

        assert!(state.role.is_dungeon_master());
        assert_eq!(state.inventories.len(), 1);
        assert_eq!(state.item_catalog.len(), 1);
        assert!(state.current_player_id().is_none());
    }
}
