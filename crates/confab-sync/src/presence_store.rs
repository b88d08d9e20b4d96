//! Abstraction over the ephemeral presence store.
//!
//! A realtime key-value store with one extra primitive: a value can be
//! registered to be written automatically if the connection drops, and
//! that registration can be cancelled. Presence writes sit outside the
//! atomic-commit discipline entirely.

use std::sync::Arc;

use thiserror::Error;

use confab_shared::{PresenceRecord, TypingRecord};

use crate::subscription::Subscription;

/// Errors surfaced by a presence store implementation.
#[derive(Error, Debug)]
pub enum PresenceError {
    #[error("Transient presence error: {0}")]
    Transient(String),

    /// Expected during sign-out races; the tracker swallows this on the
    /// teardown path only.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

/// Callback for presence snapshots of a single user; `None` when the key
/// has never been written.
pub type PresenceCallback = Arc<dyn Fn(Option<PresenceRecord>) + Send + Sync>;

/// Callback for the full typing-record list of a chat.
pub type TypingCallback = Arc<dyn Fn(Vec<TypingRecord>) + Send + Sync>;

/// Error callback for subscriptions.
pub type PresenceErrorCallback = Arc<dyn Fn(PresenceError) + Send + Sync>;

#[allow(async_fn_in_trait)]
pub trait PresenceStore: Send + Sync + 'static {
    /// Write the presence record at `presence/{user_id}`.
    async fn set_presence(&self, record: PresenceRecord) -> Result<(), PresenceError>;

    /// Write the typing record at `typing/{chat_id}/{user_id}`.
    async fn set_typing(&self, record: TypingRecord) -> Result<(), PresenceError>;

    /// Remove the typing record at `typing/{chat_id}/{user_id}`.
    async fn remove_typing(&self, chat_id: &str, user_id: &str) -> Result<(), PresenceError>;

    /// Register `record` to be written to `presence/{user_id}` if this
    /// connection terminates without an explicit write. Re-registering
    /// replaces the previous registration.
    async fn register_disconnect_write(
        &self,
        user_id: &str,
        record: PresenceRecord,
    ) -> Result<(), PresenceError>;

    /// Cancel a previously registered disconnect write. No-op if none is
    /// registered.
    async fn cancel_disconnect_write(&self, user_id: &str) -> Result<(), PresenceError>;

    fn subscribe_presence(
        &self,
        user_id: &str,
        on_data: PresenceCallback,
        on_error: PresenceErrorCallback,
    ) -> Subscription;

    fn subscribe_typing(
        &self,
        chat_id: &str,
        on_data: TypingCallback,
        on_error: PresenceErrorCallback,
    ) -> Subscription;
}
