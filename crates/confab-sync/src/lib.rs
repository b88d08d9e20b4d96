//! # confab-sync
//!
//! Synchronization core of the Confab chat client.
//!
//! Four coordinators orchestrate atomic commits against an authoritative
//! remote document store and mirror the results into the local cache:
//!
//! - [`ChatIndex`] creates and finds one-on-one chats.
//! - [`MessageLifecycleManager`] drives the send/status/reaction/delete
//!   protocol for messages.
//! - [`GroupMembershipCoordinator`] handles group creation, invite-code
//!   joins, and leave/admin-transfer.
//! - [`PresenceTracker`] maintains online/offline/typing state against the
//!   ephemeral presence store, outside the atomic-commit discipline.
//!
//! The stores themselves are injected through the [`RemoteStore`],
//! [`PresenceStore`], and [`ObjectStore`] traits so tests can substitute
//! the in-memory fakes in [`testing`].

pub mod chat_index;
pub mod groups;
pub mod messages;
pub mod objects;
pub mod presence;
pub mod presence_store;
pub mod remote;
pub mod subscription;
pub mod testing;

mod error;

pub use chat_index::ChatIndex;
pub use error::SyncError;
pub use groups::{GroupInfoPatch, GroupMembershipCoordinator};
pub use messages::{MessageLifecycleManager, OutgoingAttachment};
pub use objects::ObjectStore;
pub use presence::PresenceTracker;
pub use presence_store::{PresenceError, PresenceStore};
pub use remote::{
    CasOutcome, ChatPatch, MessagePatch, ParticipantPatch, RemoteError, RemoteStore, Write,
    WriteBatch,
};
pub use subscription::Subscription;
