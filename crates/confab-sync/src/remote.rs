//! Abstraction over the authoritative remote document store.
//!
//! The store is assumed to provide atomic batched commits across a bounded
//! set of documents and linearizable reads per document; the coordinators
//! layer application invariants on top of that primitive. Implementations
//! are injected into the coordinators, so tests run against
//! [`crate::testing::MemoryRemote`].

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use confab_shared::{Chat, ChatParticipant, Message, MessageStatus, ParticipantRole, ReactionMap};

use crate::subscription::Subscription;

/// Errors surfaced by a remote store implementation.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Remote document not found: {0}")]
    NotFound(String),

    #[error("Transient remote error: {0}")]
    Transient(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

/// Partial update of a chat document. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ChatPatch {
    pub participants: Option<Vec<String>>,
    pub group_name: Option<String>,
    pub group_description: Option<String>,
    pub group_icon: Option<String>,
    pub group_admin_id: Option<String>,
    pub invite_code: Option<String>,
    pub last_message_text: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
    pub last_message_sender_id: Option<String>,
    pub last_message_status: Option<MessageStatus>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ChatPatch {
    pub fn apply(&self, chat: &mut Chat) {
        if let Some(p) = &self.participants {
            chat.participants = p.clone();
        }
        if let Some(v) = &self.group_name {
            chat.group_name = Some(v.clone());
        }
        if let Some(v) = &self.group_description {
            chat.group_description = Some(v.clone());
        }
        if let Some(v) = &self.group_icon {
            chat.group_icon = Some(v.clone());
        }
        if let Some(v) = &self.group_admin_id {
            chat.group_admin_id = Some(v.clone());
        }
        if let Some(v) = &self.invite_code {
            chat.invite_code = Some(v.clone());
        }
        if let Some(v) = &self.last_message_text {
            chat.last_message_text = Some(v.clone());
        }
        if let Some(v) = self.last_message_time {
            chat.last_message_time = Some(v);
        }
        if let Some(v) = &self.last_message_sender_id {
            chat.last_message_sender_id = Some(v.clone());
        }
        if let Some(v) = self.last_message_status {
            chat.last_message_status = Some(v);
        }
        if let Some(v) = self.updated_at {
            chat.updated_at = Some(v);
        }
    }
}

/// Partial update of a participant record.
#[derive(Debug, Clone, Default)]
pub struct ParticipantPatch {
    pub role: Option<ParticipantRole>,
    pub last_read_message_id: Option<String>,
    pub last_read_timestamp: Option<DateTime<Utc>>,
    pub unread_count: Option<i64>,
}

impl ParticipantPatch {
    pub fn apply(&self, participant: &mut ChatParticipant) {
        if let Some(v) = self.role {
            participant.role = v;
        }
        if let Some(v) = &self.last_read_message_id {
            participant.last_read_message_id = Some(v.clone());
        }
        if let Some(v) = self.last_read_timestamp {
            participant.last_read_timestamp = Some(v);
        }
        if let Some(v) = self.unread_count {
            participant.unread_count = v;
        }
    }
}

/// Partial update of a message document.
#[derive(Debug, Clone, Default)]
pub struct MessagePatch {
    pub status: Option<MessageStatus>,
    pub deleted_for_everyone: Option<bool>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_for_me: Option<BTreeSet<String>>,
}

impl MessagePatch {
    pub fn apply(&self, message: &mut Message) {
        if let Some(v) = self.status {
            message.status = v;
        }
        if let Some(v) = self.deleted_for_everyone {
            message.deleted_for_everyone = v;
        }
        if let Some(v) = self.deleted_at {
            message.deleted_at = Some(v);
        }
        if let Some(v) = &self.deleted_for_me {
            message.deleted_for_me = v.clone();
        }
    }
}

/// One document write inside an atomic batch.
#[derive(Debug, Clone)]
pub enum Write {
    PutChat(Chat),
    UpdateChat {
        chat_id: String,
        patch: ChatPatch,
    },
    DeleteChat {
        chat_id: String,
    },
    PutParticipant(ChatParticipant),
    UpdateParticipant {
        chat_id: String,
        user_id: String,
        patch: ParticipantPatch,
    },
    DeleteParticipant {
        chat_id: String,
        user_id: String,
    },
    PutMessage(Message),
    UpdateMessage {
        chat_id: String,
        message_id: String,
        patch: MessagePatch,
    },
}

/// An ordered list of writes applied all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, write: Write) {
        self.writes.push(write);
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}

/// Outcome of a conditional (version-checked) write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Applied,
    VersionMismatch,
}

/// Snapshot callback for message subscriptions.
pub type MessagesCallback = Arc<dyn Fn(Vec<Message>) + Send + Sync>;

/// Error callback for subscriptions.
pub type RemoteErrorCallback = Arc<dyn Fn(RemoteError) + Send + Sync>;

/// The authoritative multi-writer document store.
///
/// Independent commits from different callers targeting overlapping
/// documents are not ordered or merged beyond per-commit atomicity; the
/// reaction CAS pair exists so callers can merge-before-write instead of
/// overwriting whole fields.
#[allow(async_fn_in_trait)]
pub trait RemoteStore: Send + Sync + 'static {
    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, RemoteError>;

    async fn get_participants(&self, chat_id: &str) -> Result<Vec<ChatParticipant>, RemoteError>;

    async fn get_message(
        &self,
        chat_id: &str,
        message_id: &str,
    ) -> Result<Option<Message>, RemoteError>;

    /// Find the one-on-one chat whose participant set is exactly `{a, b}`.
    async fn find_one_on_one_chat(&self, a: &str, b: &str) -> Result<Option<Chat>, RemoteError>;

    /// Look a group chat up by its current invite code.
    async fn find_chat_by_invite_code(&self, code: &str) -> Result<Option<Chat>, RemoteError>;

    /// Apply a batch atomically: either every write lands or none does.
    async fn commit(&self, batch: WriteBatch) -> Result<(), RemoteError>;

    /// Read a message together with its document version, for use with
    /// [`update_message_reactions`](Self::update_message_reactions).
    async fn get_message_versioned(
        &self,
        chat_id: &str,
        message_id: &str,
    ) -> Result<Option<(Message, u64)>, RemoteError>;

    /// Replace the reactions map only if the document version still
    /// matches `expected_version`.
    async fn update_message_reactions(
        &self,
        chat_id: &str,
        message_id: &str,
        expected_version: u64,
        reactions: ReactionMap,
    ) -> Result<CasOutcome, RemoteError>;

    /// Subscribe to message snapshots for one chat.
    fn subscribe_messages(
        &self,
        chat_id: &str,
        on_data: MessagesCallback,
        on_error: RemoteErrorCallback,
    ) -> Subscription;
}
