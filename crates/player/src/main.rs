//! Satchel Player - headless session client.
//!
//! Joins the session named by `SATCHEL_JOIN_CODE`, takes the configured seat
//! and logs every state change until the session ends or ctrl-c.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use satchel_player::application::SessionService;
use satchel_player::config::{ClientConfig, Seat};
use satchel_player::infrastructure::http_client::HttpActionEndpoint;
use satchel_player::infrastructure::messaging::SessionEvent;
use satchel_player::infrastructure::websocket::WebSocketChannel;
use satchel_player::state::MatchState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "satchel_player=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Satchel Player");

    // Environment files live at the repo root.
    let repo_root = Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..");
    let config = ClientConfig::load(&repo_root)?;
    tracing::info!(backend = %config.backend_url, "Configuration loaded");

    let endpoint = HttpActionEndpoint::new(config.action_url()?);
    let session = SessionService::new(
        config.manager_settings(),
        Box::new(WebSocketChannel::new()),
        Arc::new(endpoint),
    );
    let mut events = session.subscribe_events();
    session.on_session_lost(|| {
        tracing::error!("Connection lost for good; rejoin the session to continue");
    })?;

    let Some(code) = config.join_code.as_deref() else {
        tracing::warn!("SATCHEL_JOIN_CODE is not set; nothing to join");
        return Ok(());
    };
    session.join_session(code).await?;

    let state = tokio::select! {
        state = session.wait_for_game() => state?,
        event = wait_for_terminal(&mut events) => {
            anyhow::bail!("Session ended before the game arrived: {event:?}");
        }
    };
    if let Some(game) = &state.current_game {
        tracing::info!(
            game = %game.game.name,
            players = game.players.len(),
            "Joined session"
        );
    }

    match &config.seat {
        Some(Seat::Player(player_id)) => session.select_player(*player_id)?,
        Some(Seat::DungeonMaster { password }) => session.select_dungeon_master(password)?,
        None => tracing::info!("No seat configured; watching as a spectator"),
    }

    let mut match_state = session.match_state();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted; leaving session");
                break;
            }
            event = events.recv() => match event {
                Ok(event @ (SessionEvent::SessionLost | SessionEvent::BackendUnreachable)) => {
                    tracing::error!(?event, "Session ended");
                    break;
                }
                Ok(SessionEvent::ServerError(message)) => tracing::warn!(%message, "Backend error"),
                Ok(event) => tracing::info!(?event, "Session event"),
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "Missed session events"),
                Err(RecvError::Closed) => break,
            },
            changed = match_state.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = Arc::clone(&match_state.borrow_and_update());
                log_state(&state);
            }
        }
    }

    if let Err(e) = session.disconnect() {
        tracing::debug!(error = %e, "Connection task already stopped");
    }
    Ok(())
}

async fn wait_for_terminal(events: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    loop {
        match events.recv().await {
            Ok(event @ (SessionEvent::SessionLost | SessionEvent::BackendUnreachable)) => {
                return event
            }
            Ok(_) | Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return SessionEvent::SessionLost,
        }
    }
}

fn log_state(state: &MatchState) {
    let gold: u64 = state.inventories.values().map(|inventory| inventory.gold).sum();
    let items: usize = state
        .inventories
        .values()
        .map(|inventory| inventory.items.len())
        .sum();
    tracing::info!(
        role = ?state.role,
        inventories = state.inventories.len(),
        items,
        gold,
        catalog = state.item_catalog.len(),
        loot_phase = %state.loot.phase,
        loot_items = state.loot.items.len(),
        selling = state.selling_enabled,
        "Match state updated"
    );
}
