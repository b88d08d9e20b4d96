//! # confab-store
//!
//! Local cache for the Confab sync core, backed by SQLite.
//!
//! The cache mirrors a subset of remote state for offline reads and queues
//! outbound message mutations with per-message sync status. The crate
//! exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every table.

pub mod chats;
pub mod database;
pub mod friend_requests;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod outbound;
pub mod scroll_positions;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
