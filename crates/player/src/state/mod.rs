//! Replicated match state and its writers.
//!
//! - `match_state`: the immutable state value, patches and the store
//! - `handlers`: the built-in dispatcher handlers that mutate the store
//! - `loot`: loot phase rules and the pending vote target

pub mod handlers;
pub mod loot;
pub mod match_state;

pub use handlers::register_store_handlers;
pub use loot::{LootError, LootPhaseMachine};
pub use match_state::{MatchPatch, MatchState, MatchStateStore, ViewerRole};
