use confab_shared::{MediaError, MessageStatus};
use confab_store::StoreError;
use thiserror::Error;

use crate::presence_store::PresenceError;
use crate::remote::RemoteError;

/// Errors produced by the sync core.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Rejected before any write; never partially applied.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced chat/message/invite code does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation conflicts with current state (e.g. already a member).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A remote commit failed; not retried internally. The local cache
    /// carries the retry bookkeeping.
    #[error("Transient network error: {0}")]
    Transient(String),

    /// The store rejected the caller's credentials for this operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A message status regression outside the retry edge.
    #[error("Invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: MessageStatus,
        to: MessageStatus,
    },

    /// Local cache failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Attachment processing failure (includes the pre-upload size gate).
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    /// Internal invariant failure (e.g. a poisoned cache lock).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RemoteError> for SyncError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::NotFound(msg) => Self::NotFound(msg),
            RemoteError::Transient(msg) => Self::Transient(msg),
            RemoteError::PermissionDenied(msg) => Self::PermissionDenied(msg),
        }
    }
}

impl From<PresenceError> for SyncError {
    fn from(e: PresenceError) -> Self {
        match e {
            PresenceError::Transient(msg) => Self::Transient(msg),
            PresenceError::PermissionDenied(msg) => Self::PermissionDenied(msg),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;
