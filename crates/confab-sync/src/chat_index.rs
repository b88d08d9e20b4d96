//! One-on-one chat lookup and creation.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use confab_shared::{Chat, ChatKind, ChatParticipant, ParticipantRole};
use confab_store::Database;

use crate::error::{Result, SyncError};
use crate::remote::{RemoteStore, Write, WriteBatch};

/// Creates and finds one-on-one chats.
///
/// `create_chat` is not idempotent by itself: callers are expected to call
/// [`find_existing_chat`](Self::find_existing_chat) first. Two devices
/// racing through that sequence can still double-create; the remote store
/// does not serialize independent commits.
pub struct ChatIndex<R: RemoteStore> {
    remote: Arc<R>,
    cache: Arc<Mutex<Database>>,
}

impl<R: RemoteStore> ChatIndex<R> {
    pub fn new(remote: Arc<R>, cache: Arc<Mutex<Database>>) -> Self {
        Self { remote, cache }
    }

    fn cache(&self) -> Result<MutexGuard<'_, Database>> {
        self.cache
            .lock()
            .map_err(|e| SyncError::Internal(format!("cache lock poisoned: {e}")))
    }

    /// Find the one-on-one chat between two users.
    ///
    /// Absence is a normal outcome, not an error.
    pub async fn find_existing_chat(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Option<String>> {
        let chat = self.remote.find_one_on_one_chat(user_a, user_b).await?;
        Ok(chat.map(|c| c.id))
    }

    /// Create a one-on-one chat between two users in one atomic commit:
    /// the chat document plus one participant record per user.
    pub async fn create_chat(&self, user_a: &str, user_b: &str) -> Result<Chat> {
        if user_a.is_empty() || user_b.is_empty() {
            return Err(SyncError::Validation("user ids must not be empty".into()));
        }
        if user_a == user_b {
            return Err(SyncError::Validation(
                "a one-on-one chat needs two distinct users".into(),
            ));
        }

        let now = Utc::now();
        let chat = Chat {
            id: Uuid::new_v4().to_string(),
            kind: ChatKind::OneOnOne,
            participants: vec![user_a.to_string(), user_b.to_string()],
            created_at: now,
            created_by: user_a.to_string(),
            last_message_text: None,
            last_message_time: None,
            last_message_sender_id: None,
            last_message_status: None,
            unread_count: 0,
            group_name: None,
            group_description: None,
            group_icon: None,
            group_admin_id: None,
            invite_code: None,
            updated_at: None,
        };

        let mut batch = WriteBatch::new();
        batch.push(Write::PutChat(chat.clone()));
        for user_id in &chat.participants {
            batch.push(Write::PutParticipant(ChatParticipant::new(
                &chat.id,
                user_id,
                ParticipantRole::Member,
                now,
            )));
        }

        self.remote.commit(batch).await?;
        self.cache()?.upsert_chat(&chat)?;

        info!(chat_id = %chat.id, "one-on-one chat created");
        Ok(chat)
    }
}
