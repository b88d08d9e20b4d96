//! Domain model shared between the local cache and the sync core.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the UI layer over IPC and persisted as JSON where the local
//! schema uses text columns for structured fields.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Emoji -> set of reacting user ids.
///
/// Ordered maps/sets so serialized snapshots are stable across devices.
pub type ReactionMap = BTreeMap<String, BTreeSet<String>>;

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Kind of conversation a [`Chat`] represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChatKind {
    #[serde(rename = "one-on-one")]
    OneOnOne,
    #[serde(rename = "group")]
    Group,
}

impl ChatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneOnOne => "one-on-one",
            Self::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "one-on-one" => Some(Self::OneOnOne),
            "group" => Some(Self::Group),
            _ => None,
        }
    }
}

/// A conversation (direct or group).
///
/// Invariants maintained by the coordinators:
/// - `participants` is a set (no duplicates) and never empty for a chat that
///   still exists; emptying it deletes the chat.
/// - for `Group` chats, `group_admin_id` is always one of `participants`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    /// Unique chat identifier.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ChatKind,
    /// Member user ids, unique.
    pub participants: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,

    // Denormalized last-message summary for chat lists.
    pub last_message_text: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
    pub last_message_sender_id: Option<String>,
    pub last_message_status: Option<MessageStatus>,

    /// Locally aggregated unread count (not authoritative).
    #[serde(default)]
    pub unread_count: i64,

    // Group-only fields, None for one-on-one chats.
    pub group_name: Option<String>,
    pub group_description: Option<String>,
    pub group_icon: Option<String>,
    pub group_admin_id: Option<String>,
    pub invite_code: Option<String>,

    pub updated_at: Option<DateTime<Utc>>,
}

impl Chat {
    pub fn is_group(&self) -> bool {
        self.kind == ChatKind::Group
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }
}

// ---------------------------------------------------------------------------
// ChatParticipant
// ---------------------------------------------------------------------------

/// Role of a user inside a group chat.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Admin,
    Member,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "member" => Some(Self::Member),
            _ => None,
        }
    }
}

/// Per-user membership record, keyed by `(chat_id, user_id)`.
///
/// Created when a user joins a chat, deleted when the user leaves or the
/// chat itself is deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatParticipant {
    pub chat_id: String,
    pub user_id: String,
    pub role: ParticipantRole,
    pub joined_at: DateTime<Utc>,
    pub last_read_message_id: Option<String>,
    pub last_read_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: i64,
}

impl ChatParticipant {
    /// A fresh membership record with empty read state.
    pub fn new(chat_id: &str, user_id: &str, role: ParticipantRole, joined_at: DateTime<Utc>) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            user_id: user_id.to_string(),
            role,
            joined_at,
            last_read_message_id: None,
            last_read_timestamp: None,
            unread_count: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Delivery status of a [`Message`].
///
/// Transitions move forward one step at a time
/// (`Sending -> Sent -> Delivered -> Read`); skipping a step is rejected,
/// not normalized. `Failed` is reachable from any state and
/// `Failed -> Sending` is the only way out of it (retry).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    fn rank(&self) -> u8 {
        match self {
            Self::Sending => 0,
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Read => 3,
            // Failed sits outside the forward chain.
            Self::Failed => u8::MAX,
        }
    }

    /// Whether moving from `self` to `next` respects the status machine.
    pub fn can_transition_to(&self, next: MessageStatus) -> bool {
        match (self, next) {
            // Failed is reachable from everywhere.
            (_, Self::Failed) => true,
            // Retry is the only way out of Failed.
            (Self::Failed, Self::Sending) => true,
            (Self::Failed, _) => false,
            // Otherwise exactly one step forward.
            (current, next) => next.rank() == current.rank() + 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sending" => Some(Self::Sending),
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "read" => Some(Self::Read),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Local-only indicator of whether a message's authoritative commit landed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Synced,
    Pending,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "synced" => Some(Self::Synced),
            "pending" => Some(Self::Pending),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Content kind of a message; text and image payloads are mutually exclusive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            _ => None,
        }
    }
}

/// A translation of a message into one target language.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Translation {
    pub text: String,
    pub translated_at: DateTime<Utc>,
}

/// A single chat message.
///
/// Deleting "for everyone" keeps the row as a tombstone so clients that
/// already fetched the message can render a placeholder instead of stale
/// content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique within the chat.
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Text body; `None` for image messages.
    pub text: Option<String>,

    // Image payload; `None` for text messages.
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub caption: Option<String>,

    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,

    #[serde(default)]
    pub reactions: ReactionMap,

    /// User ids that deleted this message for themselves only.
    #[serde(default)]
    pub deleted_for_me: BTreeSet<String>,
    #[serde(default)]
    pub deleted_for_everyone: bool,
    pub deleted_at: Option<DateTime<Utc>>,

    /// Language code -> translation record.
    #[serde(default)]
    pub translations: BTreeMap<String, Translation>,
    pub detected_language: Option<String>,

    /// Local-only; never part of the remote document.
    #[serde(default = "default_sync_status")]
    pub sync_status: SyncStatus,
}

fn default_sync_status() -> SyncStatus {
    SyncStatus::Synced
}

impl Message {
    /// A fresh outbound text message at status `Sending`.
    pub fn text(id: &str, chat_id: &str, sender_id: &str, text: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            kind: MessageKind::Text,
            text: Some(text.to_string()),
            image_url: None,
            thumbnail_url: None,
            caption: None,
            timestamp,
            status: MessageStatus::Sending,
            reactions: ReactionMap::new(),
            deleted_for_me: BTreeSet::new(),
            deleted_for_everyone: false,
            deleted_at: None,
            translations: BTreeMap::new(),
            detected_language: None,
            sync_status: SyncStatus::Pending,
        }
    }

    /// A fresh outbound image message at status `Sending`.
    pub fn image(
        id: &str,
        chat_id: &str,
        sender_id: &str,
        image_url: &str,
        thumbnail_url: &str,
        caption: Option<&str>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.to_string(),
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            kind: MessageKind::Image,
            text: None,
            image_url: Some(image_url.to_string()),
            thumbnail_url: Some(thumbnail_url.to_string()),
            caption: caption.map(str::to_string),
            timestamp,
            status: MessageStatus::Sending,
            reactions: ReactionMap::new(),
            deleted_for_me: BTreeSet::new(),
            deleted_for_everyone: false,
            deleted_at: None,
            translations: BTreeMap::new(),
            detected_language: None,
            sync_status: SyncStatus::Pending,
        }
    }

    /// Summary text for the parent chat's last-message fields.
    pub fn summary_text(&self) -> String {
        match self.kind {
            MessageKind::Text => self.text.clone().unwrap_or_default(),
            MessageKind::Image => self.caption.clone().unwrap_or_else(|| "\u{1F4F7} Photo".to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Presence & typing
// ---------------------------------------------------------------------------

/// Online/offline state of one user in the ephemeral presence store.
///
/// `last_seen` is meaningful only when `is_online` is false.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub user_id: String,
    pub is_online: bool,
    pub user_name: String,
    pub last_seen: DateTime<Utc>,
}

/// An active typing indicator, keyed by `(chat_id, user_id)`.
///
/// Created on start-typing, removed on stop-typing. There is no server-side
/// expiry; a client that crashes mid-typing leaves a stale record until some
/// client removes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypingRecord {
    pub chat_id: String,
    pub user_id: String,
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A locally cached user profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub profile_picture_url: Option<String>,
    #[serde(default)]
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Friend requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl FriendRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// A pending or resolved friend request between two users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub status: FriendRequestStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_moves_forward_only() {
        use MessageStatus::*;

        assert!(Sending.can_transition_to(Sent));
        assert!(Sent.can_transition_to(Delivered));
        assert!(Delivered.can_transition_to(Read));

        // Skipping a step is rejected, not normalized.
        assert!(!Sending.can_transition_to(Delivered));
        assert!(!Sending.can_transition_to(Read));

        assert!(!Read.can_transition_to(Sent));
        assert!(!Delivered.can_transition_to(Sending));
        assert!(!Sent.can_transition_to(Sent));
    }

    #[test]
    fn failed_is_terminal_except_retry() {
        use MessageStatus::*;

        assert!(Read.can_transition_to(Failed));
        assert!(Sending.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Sending));
        assert!(!Failed.can_transition_to(Sent));
        assert!(!Failed.can_transition_to(Read));
    }

    #[test]
    fn status_string_roundtrip() {
        for s in ["sending", "sent", "delivered", "read", "failed"] {
            assert_eq!(MessageStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(MessageStatus::parse("bogus").is_none());
    }

    #[test]
    fn image_summary_prefers_caption() {
        let now = Utc::now();
        let with_caption = Message::image("m1", "c1", "u1", "url", "thumb", Some("sunset"), now);
        assert_eq!(with_caption.summary_text(), "sunset");

        let without = Message::image("m2", "c1", "u1", "url", "thumb", None, now);
        assert!(without.summary_text().contains("Photo"));
    }
}
