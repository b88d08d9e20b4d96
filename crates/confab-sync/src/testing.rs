//! In-memory fakes for the three store traits.
//!
//! Test support: the fakes live in a regular module so downstream crates
//! can drive the coordinators in their own tests without a network. They
//! panic on poisoned locks instead of propagating, which is acceptable
//! here and nowhere else in the workspace.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use confab_shared::{Chat, ChatKind, ChatParticipant, Message, PresenceRecord, ReactionMap, TypingRecord};
use confab_store::Database;

use crate::presence_store::{
    PresenceCallback, PresenceError, PresenceErrorCallback, PresenceStore, TypingCallback,
};
use crate::remote::{
    CasOutcome, MessagesCallback, RemoteError, RemoteErrorCallback, RemoteStore, Write, WriteBatch,
};
use crate::objects::ObjectStore;
use crate::subscription::Subscription;

/// A fresh in-memory local cache for coordinator tests.
pub fn memory_cache() -> Arc<Mutex<Database>> {
    Arc::new(Mutex::new(
        Database::open_in_memory().expect("in-memory database"),
    ))
}

// ---------------------------------------------------------------------------
// MemoryRemote
// ---------------------------------------------------------------------------

struct MessageSub {
    chat_id: String,
    on_data: MessagesCallback,
    alive: Arc<AtomicBool>,
}

#[derive(Default)]
struct RemoteState {
    chats: HashMap<String, Chat>,
    participants: HashMap<String, BTreeMap<String, ChatParticipant>>,
    messages: HashMap<String, BTreeMap<String, Message>>,
    versions: HashMap<(String, String), u64>,
    /// Writes-per-commit history for assertions on batch sizes.
    commits: Vec<usize>,
    /// Fail the next N commits with a transient error.
    fail_commits: u32,
    /// Injected rival reaction: the next matching CAS sees this land first
    /// and reports a version mismatch.
    reaction_conflict: Option<ReactionConflict>,
}

struct ReactionConflict {
    chat_id: String,
    message_id: String,
    emoji: String,
    user_id: String,
}

/// In-memory [`RemoteStore`] with atomic batches and per-document versions.
#[derive(Default)]
pub struct MemoryRemote {
    state: Mutex<RemoteState>,
    subs: Mutex<Vec<MessageSub>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commits fail with a transient error.
    pub fn fail_next_commits(&self, n: u32) {
        self.state.lock().expect("remote state").fail_commits = n;
    }

    /// Arrange for a rival user's reaction to land between the caller's
    /// next versioned read-modify-write, forcing one CAS retry.
    pub fn inject_reaction_conflict(
        &self,
        chat_id: &str,
        message_id: &str,
        emoji: &str,
        user_id: &str,
    ) {
        self.state.lock().expect("remote state").reaction_conflict = Some(ReactionConflict {
            chat_id: chat_id.to_string(),
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
            user_id: user_id.to_string(),
        });
    }

    /// Number of successful commits so far.
    pub fn commit_count(&self) -> usize {
        self.state.lock().expect("remote state").commits.len()
    }

    /// Write counts of each successful commit, in order.
    pub fn commit_write_counts(&self) -> Vec<usize> {
        self.state.lock().expect("remote state").commits.clone()
    }

    /// Direct snapshot of a chat document.
    pub fn chat(&self, chat_id: &str) -> Option<Chat> {
        self.state.lock().expect("remote state").chats.get(chat_id).cloned()
    }

    /// Direct snapshot of a message document.
    pub fn message(&self, chat_id: &str, message_id: &str) -> Option<Message> {
        self.state
            .lock()
            .expect("remote state")
            .messages
            .get(chat_id)
            .and_then(|m| m.get(message_id))
            .cloned()
    }

    /// Direct snapshot of a participant record.
    pub fn participant(&self, chat_id: &str, user_id: &str) -> Option<ChatParticipant> {
        self.state
            .lock()
            .expect("remote state")
            .participants
            .get(chat_id)
            .and_then(|p| p.get(user_id))
            .cloned()
    }

    fn notify_chat_subs(&self, chat_ids: &[String]) {
        let snapshots: Vec<(String, Vec<Message>)> = {
            let state = self.state.lock().expect("remote state");
            chat_ids
                .iter()
                .map(|chat_id| {
                    let mut messages: Vec<Message> = state
                        .messages
                        .get(chat_id)
                        .map(|m| m.values().cloned().collect())
                        .unwrap_or_default();
                    messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
                    (chat_id.clone(), messages)
                })
                .collect()
        };

        let subs = self.subs.lock().expect("remote subs");
        for (chat_id, messages) in snapshots {
            for sub in subs.iter() {
                if sub.chat_id == chat_id && sub.alive.load(Ordering::SeqCst) {
                    (sub.on_data)(messages.clone());
                }
            }
        }
    }
}

fn apply_write(state: &mut RemoteState, write: Write) -> Result<(), RemoteError> {
    match write {
        Write::PutChat(chat) => {
            state.chats.insert(chat.id.clone(), chat);
        }
        Write::UpdateChat { chat_id, patch } => {
            let chat = state
                .chats
                .get_mut(&chat_id)
                .ok_or_else(|| RemoteError::NotFound(format!("chat {chat_id}")))?;
            patch.apply(chat);
        }
        Write::DeleteChat { chat_id } => {
            state.chats.remove(&chat_id);
            state.participants.remove(&chat_id);
            state.messages.remove(&chat_id);
            state.versions.retain(|(c, _), _| c != &chat_id);
        }
        Write::PutParticipant(participant) => {
            state
                .participants
                .entry(participant.chat_id.clone())
                .or_default()
                .insert(participant.user_id.clone(), participant);
        }
        Write::UpdateParticipant {
            chat_id,
            user_id,
            patch,
        } => {
            let participant = state
                .participants
                .get_mut(&chat_id)
                .and_then(|p| p.get_mut(&user_id))
                .ok_or_else(|| RemoteError::NotFound(format!("participant {chat_id}/{user_id}")))?;
            patch.apply(participant);
        }
        Write::DeleteParticipant { chat_id, user_id } => {
            if let Some(p) = state.participants.get_mut(&chat_id) {
                p.remove(&user_id);
            }
        }
        Write::PutMessage(message) => {
            let key = (message.chat_id.clone(), message.id.clone());
            *state.versions.entry(key).or_insert(0) += 1;
            state
                .messages
                .entry(message.chat_id.clone())
                .or_default()
                .insert(message.id.clone(), message);
        }
        Write::UpdateMessage {
            chat_id,
            message_id,
            patch,
        } => {
            let message = state
                .messages
                .get_mut(&chat_id)
                .and_then(|m| m.get_mut(&message_id))
                .ok_or_else(|| RemoteError::NotFound(format!("message {chat_id}/{message_id}")))?;
            patch.apply(message);
            *state
                .versions
                .entry((chat_id, message_id))
                .or_insert(0) += 1;
        }
    }
    Ok(())
}

impl RemoteStore for MemoryRemote {
    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, RemoteError> {
        Ok(self.chat(chat_id))
    }

    async fn get_participants(&self, chat_id: &str) -> Result<Vec<ChatParticipant>, RemoteError> {
        Ok(self
            .state
            .lock()
            .expect("remote state")
            .participants
            .get(chat_id)
            .map(|p| p.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_message(
        &self,
        chat_id: &str,
        message_id: &str,
    ) -> Result<Option<Message>, RemoteError> {
        Ok(self.message(chat_id, message_id))
    }

    async fn find_one_on_one_chat(&self, a: &str, b: &str) -> Result<Option<Chat>, RemoteError> {
        let state = self.state.lock().expect("remote state");
        let found = state.chats.values().find(|chat| {
            chat.kind == ChatKind::OneOnOne
                && chat.participants.len() == 2
                && chat.has_participant(a)
                && chat.has_participant(b)
        });
        Ok(found.cloned())
    }

    async fn find_chat_by_invite_code(&self, code: &str) -> Result<Option<Chat>, RemoteError> {
        let state = self.state.lock().expect("remote state");
        let found = state
            .chats
            .values()
            .find(|chat| chat.invite_code.as_deref() == Some(code));
        Ok(found.cloned())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), RemoteError> {
        let affected_chats: Vec<String> = {
            let mut state = self.state.lock().expect("remote state");
            if state.fail_commits > 0 {
                state.fail_commits -= 1;
                return Err(RemoteError::Transient("simulated commit failure".into()));
            }

            // All-or-nothing: apply against a scratch copy, then swap.
            let mut scratch = RemoteState {
                chats: state.chats.clone(),
                participants: state.participants.clone(),
                messages: state.messages.clone(),
                versions: state.versions.clone(),
                ..Default::default()
            };

            let writes = batch.into_writes();
            let count = writes.len();
            let mut affected = Vec::new();
            for write in writes {
                if let Write::PutMessage(m) = &write {
                    affected.push(m.chat_id.clone());
                }
                if let Write::UpdateMessage { chat_id, .. } = &write {
                    affected.push(chat_id.clone());
                }
                apply_write(&mut scratch, write)?;
            }

            state.chats = scratch.chats;
            state.participants = scratch.participants;
            state.messages = scratch.messages;
            state.versions = scratch.versions;
            state.commits.push(count);
            affected
        };

        self.notify_chat_subs(&affected_chats);
        Ok(())
    }

    async fn get_message_versioned(
        &self,
        chat_id: &str,
        message_id: &str,
    ) -> Result<Option<(Message, u64)>, RemoteError> {
        let state = self.state.lock().expect("remote state");
        let message = state
            .messages
            .get(chat_id)
            .and_then(|m| m.get(message_id))
            .cloned();
        Ok(message.map(|m| {
            let version = state
                .versions
                .get(&(chat_id.to_string(), message_id.to_string()))
                .copied()
                .unwrap_or(0);
            (m, version)
        }))
    }

    async fn update_message_reactions(
        &self,
        chat_id: &str,
        message_id: &str,
        expected_version: u64,
        reactions: ReactionMap,
    ) -> Result<CasOutcome, RemoteError> {
        let outcome = {
            let mut state = self.state.lock().expect("remote state");

            // A configured rival lands first and invalidates the version.
            if state
                .reaction_conflict
                .as_ref()
                .is_some_and(|c| c.chat_id == chat_id && c.message_id == message_id)
            {
                let conflict = state.reaction_conflict.take().expect("checked above");
                let message = state
                    .messages
                    .get_mut(chat_id)
                    .and_then(|m| m.get_mut(message_id))
                    .ok_or_else(|| RemoteError::NotFound(format!("message {chat_id}/{message_id}")))?;
                message
                    .reactions
                    .entry(conflict.emoji)
                    .or_default()
                    .insert(conflict.user_id);
                *state
                    .versions
                    .entry((chat_id.to_string(), message_id.to_string()))
                    .or_insert(0) += 1;
                return Ok(CasOutcome::VersionMismatch);
            }

            let key = (chat_id.to_string(), message_id.to_string());
            let current = state.versions.get(&key).copied().unwrap_or(0);
            if current != expected_version {
                return Ok(CasOutcome::VersionMismatch);
            }

            let message = state
                .messages
                .get_mut(chat_id)
                .and_then(|m| m.get_mut(message_id))
                .ok_or_else(|| RemoteError::NotFound(format!("message {chat_id}/{message_id}")))?;
            message.reactions = reactions;
            *state.versions.entry(key).or_insert(0) += 1;
            CasOutcome::Applied
        };

        self.notify_chat_subs(&[chat_id.to_string()]);
        Ok(outcome)
    }

    fn subscribe_messages(
        &self,
        chat_id: &str,
        on_data: MessagesCallback,
        _on_error: RemoteErrorCallback,
    ) -> Subscription {
        let alive = Arc::new(AtomicBool::new(true));
        self.subs.lock().expect("remote subs").push(MessageSub {
            chat_id: chat_id.to_string(),
            on_data,
            alive: Arc::clone(&alive),
        });
        Subscription::new(move || alive.store(false, Ordering::SeqCst))
    }
}

// ---------------------------------------------------------------------------
// MemoryPresence
// ---------------------------------------------------------------------------

struct PresenceSub {
    user_id: String,
    on_data: PresenceCallback,
    alive: Arc<AtomicBool>,
}

struct TypingSub {
    chat_id: String,
    on_data: TypingCallback,
    alive: Arc<AtomicBool>,
}

#[derive(Default)]
struct PresenceState {
    presence: HashMap<String, PresenceRecord>,
    typing: HashMap<String, BTreeMap<String, TypingRecord>>,
    disconnect_writes: HashMap<String, PresenceRecord>,
    /// When set, every write fails with PermissionDenied (sign-out race).
    deny_writes: bool,
}

/// In-memory [`PresenceStore`] with an explicit connection-drop trigger.
#[derive(Default)]
pub struct MemoryPresence {
    state: Mutex<PresenceState>,
    presence_subs: Mutex<Vec<PresenceSub>>,
    typing_subs: Mutex<Vec<TypingSub>>,
}

impl MemoryPresence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the credential loss seen during sign-out.
    pub fn deny_writes(&self, deny: bool) {
        self.state.lock().expect("presence state").deny_writes = deny;
    }

    /// Simulate an abrupt connection loss for one user: fires the
    /// registered disconnect write, if any.
    pub fn drop_connection(&self, user_id: &str) {
        let fired = {
            let mut state = self.state.lock().expect("presence state");
            match state.disconnect_writes.remove(user_id) {
                Some(mut record) => {
                    record.last_seen = Utc::now();
                    state.presence.insert(user_id.to_string(), record.clone());
                    Some(record)
                }
                None => None,
            }
        };
        if fired.is_some() {
            self.notify_presence(user_id);
        }
    }

    pub fn presence(&self, user_id: &str) -> Option<PresenceRecord> {
        self.state
            .lock()
            .expect("presence state")
            .presence
            .get(user_id)
            .cloned()
    }

    pub fn has_disconnect_registration(&self, user_id: &str) -> bool {
        self.state
            .lock()
            .expect("presence state")
            .disconnect_writes
            .contains_key(user_id)
    }

    pub fn typing_records(&self, chat_id: &str) -> Vec<TypingRecord> {
        self.state
            .lock()
            .expect("presence state")
            .typing
            .get(chat_id)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    fn notify_presence(&self, user_id: &str) {
        let record = self.presence(user_id);
        let subs = self.presence_subs.lock().expect("presence subs");
        for sub in subs.iter() {
            if sub.user_id == user_id && sub.alive.load(Ordering::SeqCst) {
                (sub.on_data)(record.clone());
            }
        }
    }

    fn notify_typing(&self, chat_id: &str) {
        let records = self.typing_records(chat_id);
        let subs = self.typing_subs.lock().expect("typing subs");
        for sub in subs.iter() {
            if sub.chat_id == chat_id && sub.alive.load(Ordering::SeqCst) {
                (sub.on_data)(records.clone());
            }
        }
    }

    fn check_writable(&self) -> Result<(), PresenceError> {
        if self.state.lock().expect("presence state").deny_writes {
            return Err(PresenceError::PermissionDenied(
                "client is signed out".into(),
            ));
        }
        Ok(())
    }
}

impl PresenceStore for MemoryPresence {
    async fn set_presence(&self, record: PresenceRecord) -> Result<(), PresenceError> {
        self.check_writable()?;
        let user_id = record.user_id.clone();
        self.state
            .lock()
            .expect("presence state")
            .presence
            .insert(user_id.clone(), record);
        self.notify_presence(&user_id);
        Ok(())
    }

    async fn set_typing(&self, record: TypingRecord) -> Result<(), PresenceError> {
        self.check_writable()?;
        let chat_id = record.chat_id.clone();
        self.state
            .lock()
            .expect("presence state")
            .typing
            .entry(chat_id.clone())
            .or_default()
            .insert(record.user_id.clone(), record);
        self.notify_typing(&chat_id);
        Ok(())
    }

    async fn remove_typing(&self, chat_id: &str, user_id: &str) -> Result<(), PresenceError> {
        self.check_writable()?;
        {
            let mut state = self.state.lock().expect("presence state");
            if let Some(t) = state.typing.get_mut(chat_id) {
                t.remove(user_id);
            }
        }
        self.notify_typing(chat_id);
        Ok(())
    }

    async fn register_disconnect_write(
        &self,
        user_id: &str,
        record: PresenceRecord,
    ) -> Result<(), PresenceError> {
        self.check_writable()?;
        self.state
            .lock()
            .expect("presence state")
            .disconnect_writes
            .insert(user_id.to_string(), record);
        Ok(())
    }

    async fn cancel_disconnect_write(&self, user_id: &str) -> Result<(), PresenceError> {
        self.check_writable()?;
        self.state
            .lock()
            .expect("presence state")
            .disconnect_writes
            .remove(user_id);
        Ok(())
    }

    fn subscribe_presence(
        &self,
        user_id: &str,
        on_data: PresenceCallback,
        _on_error: PresenceErrorCallback,
    ) -> Subscription {
        let alive = Arc::new(AtomicBool::new(true));
        self.presence_subs
            .lock()
            .expect("presence subs")
            .push(PresenceSub {
                user_id: user_id.to_string(),
                on_data,
                alive: Arc::clone(&alive),
            });
        Subscription::new(move || alive.store(false, Ordering::SeqCst))
    }

    fn subscribe_typing(
        &self,
        chat_id: &str,
        on_data: TypingCallback,
        _on_error: PresenceErrorCallback,
    ) -> Subscription {
        let alive = Arc::new(AtomicBool::new(true));
        self.typing_subs
            .lock()
            .expect("typing subs")
            .push(TypingSub {
                chat_id: chat_id.to_string(),
                on_data,
                alive: Arc::clone(&alive),
            });
        Subscription::new(move || alive.store(false, Ordering::SeqCst))
    }
}

// ---------------------------------------------------------------------------
// MemoryObjects
// ---------------------------------------------------------------------------

/// In-memory [`ObjectStore`] that records upload paths and sizes.
#[derive(Default)]
pub struct MemoryObjects {
    uploads: Mutex<Vec<(String, usize)>>,
}

impl MemoryObjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().expect("uploads").len()
    }

    pub fn uploads(&self) -> Vec<(String, usize)> {
        self.uploads.lock().expect("uploads").clone()
    }
}

impl ObjectStore for MemoryObjects {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<String, RemoteError> {
        self.uploads
            .lock()
            .expect("uploads")
            .push((path.to_string(), bytes.len()));
        Ok(format!("mem://{path}"))
    }
}
