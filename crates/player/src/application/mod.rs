//! Application services: the session surface used by the UI.

pub mod error;
pub mod services;

pub use error::SessionError;
pub use services::{InventoryService, LootService, SessionService};
