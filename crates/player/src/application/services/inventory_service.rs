//! Inventory Service - gold, items and the item catalog
//!
//! Every command is checked against the current match state before it is
//! posted. The resulting `inventory_update`, `gold_update` and
//! `item_removal` messages are folded into the state by the store handlers.

use std::sync::Arc;

use satchel_domain::{ItemId, ItemPrefab, PlayerId, PrefabId};
use satchel_shared::{ClientMessage, MessageKind, ServerMessage};
use tokio::sync::{oneshot, watch};

use super::session_service::expect_ack;
use crate::application::error::SessionError;
use crate::infrastructure::messaging::{CommandBus, Registration};
use crate::state::MatchState;

/// Identifier of the one-shot handler waiting for an import result.
pub const IMPORT_ITEMS_HANDLER: &str = "import_items_handler";

#[derive(Clone)]
pub struct InventoryService {
    commands: CommandBus,
    match_state: watch::Receiver<Arc<MatchState>>,
}

impl InventoryService {
    pub fn new(commands: CommandBus, match_state: watch::Receiver<Arc<MatchState>>) -> Self {
        Self {
            commands,
            match_state,
        }
    }

    fn state(&self) -> Arc<MatchState> {
        Arc::clone(&self.match_state.borrow())
    }

    /// Add a player to the session (DM only).
    pub fn create_player(&self, name: &str, gold: u64) -> Result<(), SessionError> {
        let state = self.state();
        require_dm(&state, "create players")?;
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::InvalidInput("player name is empty"));
        }
        self.commands.send(ClientMessage::CreatePlayer {
            player_name: name.to_string(),
            gold,
        })?;
        Ok(())
    }

    pub fn set_gold(&self, player_id: PlayerId, gold: u64) -> Result<(), SessionError> {
        let state = self.state();
        require_dm(&state, "set gold")?;
        require_known_player(&state, player_id)?;
        self.commands
            .send(ClientMessage::SetPlayerGold { player_id, gold })?;
        Ok(())
    }

    /// Give a fresh instance of a catalog entry to a player (DM only).
    pub fn give_item(&self, player_id: PlayerId, prefab: PrefabId) -> Result<(), SessionError> {
        let state = self.state();
        require_dm(&state, "give items")?;
        require_known_player(&state, player_id)?;
        if !state.item_catalog.iter().any(|entry| entry.id == prefab) {
            return Err(SessionError::UnknownPrefab(prefab));
        }
        self.commands.send(ClientMessage::GiveItem {
            player_id,
            item_id: prefab,
        })?;
        Ok(())
    }

    /// Delete an item from whichever visible inventory holds it.
    pub fn delete_item(&self, item_id: ItemId) -> Result<(), SessionError> {
        let state = self.state();
        if owner_of(&state, item_id).is_none() {
            return Err(SessionError::UnknownItem(item_id));
        }
        self.commands.send(ClientMessage::DeleteItem { item_id })?;
        Ok(())
    }

    /// Hand one of the viewer's items to another player.
    pub fn send_item(&self, recipient: PlayerId, item_id: ItemId) -> Result<(), SessionError> {
        let state = self.state();
        let viewer = require_owned(&state, item_id)?;
        let roster_has_recipient = state
            .current_game
            .as_ref()
            .is_some_and(|game| game.has_player(recipient));
        if recipient == viewer || !roster_has_recipient {
            return Err(SessionError::UnknownPlayer(recipient));
        }
        self.commands.send(ClientMessage::SendItem {
            player_id: recipient,
            item_id,
        })?;
        Ok(())
    }

    pub fn sell_item(&self, item_id: ItemId) -> Result<(), SessionError> {
        let state = self.state();
        require_owned(&state, item_id)?;
        if !state.selling_enabled {
            return Err(SessionError::SellingDisabled);
        }
        self.commands.send(ClientMessage::SellItem { item_id })?;
        Ok(())
    }

    pub fn toggle_selling(&self) -> Result<(), SessionError> {
        let state = self.state();
        require_dm(&state, "toggle selling")?;
        self.commands.send(ClientMessage::ToggleSelling)?;
        Ok(())
    }

    /// Import new catalog entries (DM only). Resolves to the backend's
    /// success flag.
    ///
    /// The result may come back as the command reply or later on the
    /// stream; a one-shot handler catches either. Only one import can be
    /// in flight: a second call replaces the first one's handler.
    pub async fn import_items(&self, items: Vec<ItemPrefab>) -> Result<bool, SessionError> {
        let state = self.state();
        require_dm(&state, "import items")?;
        if items.is_empty() {
            return Err(SessionError::InvalidInput("nothing to import"));
        }

        let (result_tx, result_rx) = oneshot::channel();
        let mut result_tx = Some(result_tx);
        let registration = Registration::new(MessageKind::ItemsImported, move |message, ctx| {
            if let ServerMessage::ItemsImported { success } = message {
                if let Some(sender) = result_tx.take() {
                    let _ = sender.send(*success);
                }
            }
            ctx.remove_registration();
            Ok(())
        })
        .with_identifier(IMPORT_ITEMS_HANDLER);
        self.commands.register(registration).await?;

        let count = items.len();
        let reply = match self
            .commands
            .request(ClientMessage::ImportNewItems { items })
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                let _ = self.commands.unregister_identifier(IMPORT_ITEMS_HANDLER);
                return Err(e.into());
            }
        };
        if let Err(e) = expect_ack("ImportNewItems", reply, MessageKind::ItemsImported) {
            let _ = self.commands.unregister_identifier(IMPORT_ITEMS_HANDLER);
            return Err(e);
        }

        let success = result_rx
            .await
            .map_err(|_| SessionError::Bus(anyhow::anyhow!("Import result handler was dropped")))?;
        tracing::info!(count, success, "Item import finished");
        Ok(success)
    }
}

fn require_dm(state: &MatchState, action: &'static str) -> Result<(), SessionError> {
    if state.role.is_dungeon_master() {
        Ok(())
    } else {
        Err(SessionError::NotDungeonMaster(action))
    }
}

fn require_known_player(state: &MatchState, player_id: PlayerId) -> Result<(), SessionError> {
    if state.inventories.contains_key(&player_id) {
        Ok(())
    } else {
        Err(SessionError::UnknownPlayer(player_id))
    }
}

/// The viewer's id, when the viewer's own inventory holds `item_id`.
fn require_owned(state: &MatchState, item_id: ItemId) -> Result<PlayerId, SessionError> {
    let viewer = state.current_player_id().ok_or(SessionError::NoViewer)?;
    match state.own_inventory() {
        Some(inventory) if inventory.items.contains_key(&item_id) => Ok(viewer),
        _ => Err(SessionError::UnknownItem(item_id)),
    }
}

fn owner_of(state: &MatchState, item_id: ItemId) -> Option<PlayerId> {
    state
        .inventories
        .values()
        .find(|inventory| inventory.items.contains_key(&item_id))
        .map(|inventory| inventory.player_id)
}
