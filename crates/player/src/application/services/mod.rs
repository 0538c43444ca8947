//! Application services
//!
//! Each service is constructed explicitly from a session's [`Connection`]
//! parts and lives as long as that session.
//!
//! [`Connection`]: crate::infrastructure::websocket::Connection

pub mod inventory_service;
pub mod loot_service;
pub mod session_service;

pub use inventory_service::{InventoryService, IMPORT_ITEMS_HANDLER};
pub use loot_service::LootService;
pub use session_service::{SessionService, SESSION_CLEANUP};
