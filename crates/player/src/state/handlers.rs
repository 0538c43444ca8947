//! Built-in store handlers.
//!
//! These are the only writers of [`MatchState`]. Each one is registered under
//! a fixed identifier and marked persistent, so registering them twice is
//! harmless and a clean disconnect keeps them.

use satchel_domain::PlayerId;
use satchel_shared::{GameInfoPayload, GoldUpdate, InventoryUpdate, ItemRemoval, MessageKind, ServerMessage};

use super::loot::LootPhaseMachine;
use super::match_state::{MatchPatch, MatchState, ViewerRole};
use crate::infrastructure::messaging::{
    HandlerContext, HandlerResult, MessageDispatcher, Registration, SessionEvent,
};

pub const GAME_INFO_HANDLER: &str = "store.game_info";
pub const INVENTORY_UPDATE_HANDLER: &str = "store.inventory_update";
pub const GOLD_UPDATE_HANDLER: &str = "store.gold_update";
pub const ITEM_REMOVAL_HANDLER: &str = "store.item_removal";
pub const LOOT_UPDATE_HANDLER: &str = "store.loot_update";
pub const SELLING_TOGGLED_HANDLER: &str = "store.selling_toggled";
pub const ERROR_HANDLER: &str = "session.error";
pub const NOTIFICATION_HANDLER: &str = "session.notification";

/// Register every built-in handler on `dispatcher`.
pub fn register_store_handlers(dispatcher: &mut MessageDispatcher) {
    let builtin = [
        (GAME_INFO_HANDLER, MessageKind::GameInfo),
        (INVENTORY_UPDATE_HANDLER, MessageKind::InventoryUpdate),
        (GOLD_UPDATE_HANDLER, MessageKind::GoldUpdate),
        (ITEM_REMOVAL_HANDLER, MessageKind::ItemRemoval),
        (LOOT_UPDATE_HANDLER, MessageKind::LootUpdate),
        (SELLING_TOGGLED_HANDLER, MessageKind::SellingToggled),
        (ERROR_HANDLER, MessageKind::Error),
        (NOTIFICATION_HANDLER, MessageKind::Notification),
    ];

    for (identifier, kind) in builtin {
        dispatcher.register(
            Registration::new(kind, handle_store_message)
                .with_identifier(identifier)
                .persistent(),
        );
    }
}

fn handle_store_message(message: &ServerMessage, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    match message {
        ServerMessage::GameInfo { msg } => on_game_info(msg, ctx),
        ServerMessage::InventoryUpdate { msg } => on_inventory_update(msg, ctx),
        ServerMessage::GoldUpdate { msg } => on_gold_update(msg, ctx),
        ServerMessage::ItemRemoval { msg } => on_item_removal(msg, ctx),
        ServerMessage::LootUpdate { msg } => {
            let loot = LootPhaseMachine::reduce(&ctx.state().loot, msg.clone());
            ctx.apply(MatchPatch::loot(loot));
            Ok(())
        }
        ServerMessage::SellingToggled { msg } => {
            ctx.apply(MatchPatch {
                selling_enabled: Some(*msg),
                ..MatchPatch::default()
            });
            Ok(())
        }
        ServerMessage::Error { msg } => {
            tracing::warn!(error = %msg, "Backend rejected a command");
            ctx.emit(SessionEvent::ServerError(msg.clone()));
            Ok(())
        }
        ServerMessage::Notification { msg } => {
            ctx.emit(SessionEvent::Notification(msg.clone()));
            Ok(())
        }
        ServerMessage::Register { .. }
        | ServerMessage::SyncToken { .. }
        | ServerMessage::ItemsImported { .. }
        | ServerMessage::Unknown => Ok(()),
    }
}

fn on_game_info(payload: &GameInfoPayload, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let mut payload = payload.clone();
    payload.loot = payload
        .loot
        .map(|loot| LootPhaseMachine::reduce(&ctx.state().loot, loot));

    if payload.is_full_snapshot() {
        let next = MatchState::from_snapshot(ctx.state(), payload);
        tracing::debug!(
            role = ?next.role,
            inventories = next.inventories.len(),
            "Applied full snapshot"
        );
        ctx.replace(next);
    } else {
        ctx.apply(MatchPatch {
            item_catalog: payload.item_catalog,
            loot: payload.loot,
            ..MatchPatch::default()
        });
    }
    Ok(())
}

/// Inventory an item update or removal lands in.
///
/// A player's stream only carries updates for that player, so the player
/// view writes its own inventory whatever id the message names.
fn addressed_inventory(state: &MatchState, player_id: PlayerId) -> PlayerId {
    match state.role {
        ViewerRole::Player(viewer) => {
            if viewer != player_id {
                tracing::debug!(%viewer, %player_id, "Item update names another player");
            }
            viewer
        }
        ViewerRole::DungeonMaster | ViewerRole::None => player_id,
    }
}

/// Upsert one item; players not already in `inventories` are never created.
fn on_inventory_update(update: &InventoryUpdate, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    update.item.validate()?;

    let state = ctx.state();
    let player_id = addressed_inventory(state, update.player_id);
    let Some(inventory) = state.inventories.get(&player_id) else {
        tracing::debug!(
            player_id = %player_id,
            item_id = %update.item_id,
            "Inventory update for a player without an inventory, ignoring"
        );
        return Ok(());
    };

    let mut inventories = state.inventories.clone();
    inventories.insert(
        player_id,
        inventory
            .clone()
            .with_item(update.item_id, update.item.clone()),
    );
    ctx.apply(MatchPatch::inventories(inventories));
    Ok(())
}

/// Set gold to an exact value in the inventory and the roster copy.
fn on_gold_update(update: &GoldUpdate, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let state = ctx.state();
    let mut patch = MatchPatch::default();

    if let Some(inventory) = state.inventories.get(&update.player_id) {
        if inventory.gold != update.gold {
            let mut inventories = state.inventories.clone();
            inventories.insert(update.player_id, inventory.clone().with_gold(update.gold));
            patch.inventories = Some(inventories);
        }
    }

    if let Some(game) = state.current_game.as_ref() {
        let stale = game
            .player(update.player_id)
            .is_some_and(|player| player.gold != update.gold);
        if stale {
            patch.current_game = Some(game.with_player_gold(update.player_id, update.gold));
        }
    }

    ctx.apply(patch);
    Ok(())
}

fn on_item_removal(removal: &ItemRemoval, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let state = ctx.state();
    let player_id = addressed_inventory(state, removal.player_id);
    let Some(inventory) = state
        .inventories
        .get(&player_id)
        .filter(|inventory| inventory.items.contains_key(&removal.item_id))
    else {
        tracing::debug!(
            player_id = %player_id,
            item_id = %removal.item_id,
            "Removal of an unknown item, ignoring"
        );
        return Ok(());
    };

    let mut inventories = state.inventories.clone();
    inventories.insert(
        player_id,
        inventory.clone().without_item(removal.item_id),
    );
    ctx.apply(MatchPatch::inventories(inventories));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    use satchel_domain::{
        GameId, GameInfo, GameSummary, Inventory, ItemId, ItemInstance, ItemRarity, ItemType,
        LootId, LootItem, LootPhase, LootState, PlayerId, PlayerSummary,
    };
    use satchel_shared::ClientMessage;

    use crate::state::{MatchStateStore, ViewerRole};

    struct Harness {
        dispatcher: MessageDispatcher,
        store: MatchStateStore,
        outbox: Vec<ClientMessage>,
        events: Vec<SessionEvent>,
    }

    impl Harness {
        fn new() -> Self {
            let mut dispatcher = MessageDispatcher::new();
            register_store_handlers(&mut dispatcher);
            Self {
                dispatcher,
                store: MatchStateStore::new(),
                outbox: Vec::new(),
                events: Vec::new(),
            }
        }

        fn deliver(&mut self, message: ServerMessage) {
            let report = self.dispatcher.dispatch(
                &message,
                &mut self.store,
                &mut self.outbox,
                &mut self.events,
            );
            assert_eq!(report.failed, 0, "handler failed for {:?}", message.kind());
        }

        fn state(&self) -> std::sync::Arc<MatchState> {
            self.store.snapshot()
        }
    }

    fn p(id: i64) -> PlayerId {
        PlayerId::new(id)
    }

    fn item(id: i64, name: &str) -> ItemInstance {
        ItemInstance {
            id: ItemId::new(id),
            prefab_id: None,
            name: name.into(),
            description: String::new(),
            image: String::new(),
            rarity: ItemRarity::Common,
            item_type: ItemType::Misc,
            value: 3,
            count: 1,
        }
    }

    fn game() -> GameInfo {
        GameInfo {
            game: GameSummary {
                id: GameId::new(1),
                name: "Crypt".into(),
                join_code: "ABCD".into(),
            },
            players: vec![
                PlayerSummary {
                    id: p(1),
                    name: "Aria".into(),
                    gold: 10,
                },
                PlayerSummary {
                    id: p(2),
                    name: "Bram".into(),
                    gold: 20,
                },
            ],
        }
    }

    fn dm_snapshot() -> ServerMessage {
        ServerMessage::GameInfo {
            msg: GameInfoPayload {
                game: Some(game()),
                player: Some(PlayerId::DUNGEON_MASTER),
                is_dm: Some(true),
                inventories: Some(BTreeMap::from([
                    (p(1), Inventory::new(p(1), "Aria", 10)),
                    (p(2), Inventory::new(p(2), "Bram", 20)),
                ])),
                ..GameInfoPayload::default()
            },
        }
    }

    fn dm_harness() -> Harness {
        let mut harness = Harness::new();
        harness.deliver(dm_snapshot());
        harness
    }

    /// Aria's view: only her own inventory, holding a torch.
    fn player_harness() -> Harness {
        let mut harness = Harness::new();
        harness.deliver(ServerMessage::GameInfo {
            msg: GameInfoPayload {
                game: Some(game()),
                player: Some(p(1)),
                is_dm: Some(false),
                inventory: Some(BTreeMap::from([(ItemId::new(5), item(5, "Torch"))])),
                ..GameInfoPayload::default()
            },
        });
        harness
    }

    #[test]
    fn registering_twice_keeps_one_handler_per_kind() {
        let mut dispatcher = MessageDispatcher::new();
        register_store_handlers(&mut dispatcher);
        register_store_handlers(&mut dispatcher);

        assert_eq!(dispatcher.handlers_for(MessageKind::GameInfo), 1);
        assert_eq!(dispatcher.handler_count(), 8);
    }

    #[test]
    fn full_snapshot_replaces_state() {
        let harness = dm_harness();
        let state = harness.state();

        assert_eq!(state.role, ViewerRole::DungeonMaster);
        assert_eq!(state.inventories.len(), 2);
        assert_eq!(state.current_game, Some(game()));
    }

    #[test]
    fn catalog_only_game_info_patches_catalog() {
        let mut harness = dm_harness();
        let catalog = vec![satchel_domain::ItemPrefab {
            id: satchel_domain::PrefabId::new(4),
            name: "Rope".into(),
            description: String::new(),
            image: String::new(),
            rarity: ItemRarity::Mundane,
            item_type: ItemType::AdventureGear,
            value: 1,
            stackable: true,
            unique: false,
        }];

        harness.deliver(ServerMessage::GameInfo {
            msg: GameInfoPayload {
                item_catalog: Some(catalog.clone()),
                ..GameInfoPayload::default()
            },
        });

        let state = harness.state();
        assert_eq!(state.item_catalog, catalog);
        assert_eq!(state.inventories.len(), 2, "inventories untouched");
    }

    #[test]
    fn inventory_update_for_unknown_player_is_ignored() {
        let mut harness = dm_harness();
        let before = harness.store.revision();

        harness.deliver(ServerMessage::InventoryUpdate {
            msg: InventoryUpdate {
                player_id: p(3),
                item_id: ItemId::new(7),
                item: item(7, "Lantern"),
            },
        });

        assert!(!harness.state().inventories.contains_key(&p(3)));
        assert_eq!(harness.store.revision(), before);
    }

    #[test]
    fn inventory_update_upserts_item() {
        let mut harness = dm_harness();

        harness.deliver(ServerMessage::InventoryUpdate {
            msg: InventoryUpdate {
                player_id: p(2),
                item_id: ItemId::new(7),
                item: item(7, "Lantern"),
            },
        });

        let state = harness.state();
        let bram = state.inventories.get(&p(2)).expect("inventory");
        assert_eq!(bram.items.get(&ItemId::new(7)), Some(&item(7, "Lantern")));
        assert!(state.inventories.get(&p(1)).expect("inventory").items.is_empty());
    }

    #[test]
    fn inventory_update_with_zero_count_fails_without_writing() {
        let mut harness = dm_harness();
        let mut broken = item(7, "Lantern");
        broken.count = 0;

        let report = harness.dispatcher.dispatch(
            &ServerMessage::InventoryUpdate {
                msg: InventoryUpdate {
                    player_id: p(2),
                    item_id: ItemId::new(7),
                    item: broken,
                },
            },
            &mut harness.store,
            &mut harness.outbox,
            &mut harness.events,
        );

        assert_eq!(report.failed, 1);
        assert!(harness.state().inventories[&p(2)].items.is_empty());
    }

    #[test]
    fn gold_update_sets_exact_value_and_roster_copy() {
        let mut harness = dm_harness();
        let update = ServerMessage::GoldUpdate {
            msg: GoldUpdate {
                player_id: p(2),
                gold: 150,
            },
        };

        harness.deliver(update.clone());
        let first = harness.state();
        let revision = harness.store.revision();
        harness.deliver(update);

        assert_eq!(first.inventories[&p(2)].gold, 150);
        let roster = first.current_game.as_ref().expect("game");
        assert_eq!(roster.player(p(2)).map(|player| player.gold), Some(150));
        assert_eq!(*harness.state(), *first);
        assert_eq!(harness.store.revision(), revision, "second update is a no-op");
    }

    #[test]
    fn gold_update_never_creates_inventories() {
        let mut harness = dm_harness();

        harness.deliver(ServerMessage::GoldUpdate {
            msg: GoldUpdate {
                player_id: p(9),
                gold: 5,
            },
        });

        assert!(!harness.state().inventories.contains_key(&p(9)));
    }

    #[test]
    fn item_removal_deletes_one_key() {
        let mut harness = dm_harness();
        for (id, name) in [(7, "Lantern"), (8, "Rope")] {
            harness.deliver(ServerMessage::InventoryUpdate {
                msg: InventoryUpdate {
                    player_id: p(1),
                    item_id: ItemId::new(id),
                    item: item(id, name),
                },
            });
        }

        harness.deliver(ServerMessage::ItemRemoval {
            msg: ItemRemoval {
                player_id: p(1),
                item_id: ItemId::new(7),
            },
        });

        let state = harness.state();
        let items = &state.inventories[&p(1)].items;
        assert_eq!(items.keys().copied().collect::<Vec<_>>(), vec![ItemId::new(8)]);
    }

    #[test]
    fn errors_and_notifications_become_events() {
        let mut harness = dm_harness();
        let before = harness.state();

        harness.deliver(ServerMessage::Error {
            msg: "Not enough gold".into(),
        });
        harness.deliver(ServerMessage::Notification {
            msg: "Bram joined".into(),
        });

        assert_eq!(
            harness.events,
            vec![
                SessionEvent::ServerError("Not enough gold".into()),
                SessionEvent::Notification("Bram joined".into()),
            ]
        );
        assert_eq!(*harness.state(), *before, "errors leave state untouched");
    }

    fn loot_update(loot: LootState) -> ServerMessage {
        ServerMessage::LootUpdate { msg: loot }
    }

    fn pool(count: i64) -> BTreeMap<LootId, LootItem> {
        (1..=count)
            .map(|id| (LootId::new(id), LootItem::new(LootId::new(id), item(id * 10, "Gem"))))
            .collect()
    }

    // Generate, distribute, claim, ready, vote: phases only move on backend updates.
    #[test]
    fn loot_round_follows_backend_updates() {
        let mut harness = dm_harness();

        // Generate two common items: pool fills, phase stays Idle.
        harness.deliver(loot_update(LootState {
            items: pool(2),
            ..LootState::default()
        }));
        let state = harness.state();
        assert_eq!(state.loot.items.len(), 2);
        assert_eq!(state.loot.phase, LootPhase::Idle);

        // Distribute to P1 and P2.
        let participants: BTreeSet<_> = [p(1), p(2)].into_iter().collect();
        let mut claiming = LootState {
            phase: LootPhase::Claiming,
            items: pool(2),
            participants: participants.clone(),
            ..LootState::default()
        };
        harness.deliver(loot_update(claiming.clone()));
        let state = harness.state();
        assert_eq!(state.loot.phase, LootPhase::Claiming);
        assert_eq!(state.loot.participants, participants);
        assert!(state.loot.ready.is_empty());

        // P1 claims item 1 and both finish claiming.
        if let Some(first) = claiming.items.get_mut(&LootId::new(1)) {
            first.claims.insert(p(1));
        }
        claiming.ready = participants.clone();
        harness.deliver(loot_update(claiming.clone()));
        assert_eq!(harness.state().loot.phase, LootPhase::Claiming);

        let voting = LootState {
            phase: LootPhase::Voting,
            ready: BTreeSet::new(),
            ..claiming
        };
        harness.deliver(loot_update(voting));

        let state = harness.state();
        assert_eq!(state.loot.phase, LootPhase::Voting);
        assert!(state.loot.items[&LootId::new(1)].is_claimed_by(p(1)));
    }

    #[test]
    fn loot_update_drops_non_participant_marks() {
        let mut harness = dm_harness();
        let mut items = pool(1);
        if let Some(first) = items.get_mut(&LootId::new(1)) {
            first.claims = [p(1), p(7)].into_iter().collect();
        }

        harness.deliver(loot_update(LootState {
            phase: LootPhase::Claiming,
            items,
            participants: [p(1)].into_iter().collect(),
            ready: [p(7)].into_iter().collect(),
            ..LootState::default()
        }));

        let state = harness.state();
        let loot = &state.loot;
        assert!(loot.ready.is_empty());
        assert_eq!(loot.items[&LootId::new(1)].claims.len(), 1);
        assert!(loot.validate().is_ok());
    }

    #[test]
    fn selling_toggle_patches_flag() {
        let mut harness = dm_harness();
        harness.deliver(ServerMessage::SellingToggled { msg: true });
        assert!(harness.state().selling_enabled);
    }

    #[test]
    fn player_snapshot_holds_only_the_viewer() {
        let state = player_harness().state();

        assert_eq!(state.role, ViewerRole::Player(p(1)));
        assert_eq!(state.inventories.keys().copied().collect::<Vec<_>>(), vec![p(1)]);
        assert_eq!(state.inventories[&p(1)].gold, 10);
    }

    #[test]
    fn player_inventory_update_writes_own_inventory() {
        let mut harness = player_harness();

        harness.deliver(ServerMessage::InventoryUpdate {
            msg: InventoryUpdate {
                player_id: p(1),
                item_id: ItemId::new(7),
                item: item(7, "Lantern"),
            },
        });
        // Ids other than the viewer's still address the viewer.
        harness.deliver(ServerMessage::InventoryUpdate {
            msg: InventoryUpdate {
                player_id: p(2),
                item_id: ItemId::new(8),
                item: item(8, "Rope"),
            },
        });

        let state = harness.state();
        assert_eq!(state.inventories.len(), 1, "no entry created for player 2");
        let items = &state.inventories[&p(1)].items;
        assert_eq!(
            items.keys().copied().collect::<Vec<_>>(),
            vec![ItemId::new(5), ItemId::new(7), ItemId::new(8)]
        );
    }

    #[test]
    fn player_item_removal_ignores_unknown_items() {
        let mut harness = player_harness();

        harness.deliver(ServerMessage::ItemRemoval {
            msg: ItemRemoval {
                player_id: p(1),
                item_id: ItemId::new(5),
            },
        });
        assert!(harness.state().inventories[&p(1)].items.is_empty());

        let revision = harness.store.revision();
        harness.deliver(ServerMessage::ItemRemoval {
            msg: ItemRemoval {
                player_id: p(1),
                item_id: ItemId::new(99),
            },
        });
        assert_eq!(harness.store.revision(), revision);
    }

    #[test]
    fn player_gold_updates_are_idempotent() {
        let mut harness = player_harness();
        let own = ServerMessage::GoldUpdate {
            msg: GoldUpdate {
                player_id: p(1),
                gold: 150,
            },
        };

        harness.deliver(own.clone());
        let revision = harness.store.revision();
        harness.deliver(own);
        assert_eq!(harness.store.revision(), revision, "same value twice is a no-op");

        // Another player's gold only touches the roster copy.
        harness.deliver(ServerMessage::GoldUpdate {
            msg: GoldUpdate {
                player_id: p(2),
                gold: 75,
            },
        });

        let state = harness.state();
        assert_eq!(state.inventories[&p(1)].gold, 150);
        assert!(!state.inventories.contains_key(&p(2)));
        let roster = state.current_game.as_ref().expect("game");
        assert_eq!(roster.player(p(1)).map(|player| player.gold), Some(150));
        assert_eq!(roster.player(p(2)).map(|player| player.gold), Some(75));
    }
}
