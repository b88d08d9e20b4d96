//! Message lifecycle: send, delivery status, reactions, deletes, and the
//! failed-send retry path.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use confab_shared::constants::{DEFAULT_MESSAGE_PAGE, REACTION_MERGE_ATTEMPTS};
use confab_shared::media::prepare_image;
use confab_shared::{Message, MessageStatus, SyncStatus};
use confab_store::{Database, ScrollPosition, StoreError};

use crate::error::{Result, SyncError};
use crate::objects::ObjectStore;
use crate::remote::{
    CasOutcome, ChatPatch, MessagePatch, MessagesCallback, ParticipantPatch, RemoteErrorCallback,
    RemoteStore, Write, WriteBatch,
};
use crate::subscription::Subscription;

/// An image attachment to send. Mutually exclusive with message text.
#[derive(Debug, Clone)]
pub struct OutgoingAttachment {
    pub bytes: Vec<u8>,
    pub caption: Option<String>,
}

/// Drives the message send/status/reaction/delete protocol.
///
/// The local cache is written synchronously before the remote commit is
/// awaited, so an outbound message is visible locally even if the commit
/// later fails; per-message sync status reconciles the two.
pub struct MessageLifecycleManager<R: RemoteStore, O: ObjectStore> {
    remote: Arc<R>,
    objects: Arc<O>,
    cache: Arc<Mutex<Database>>,
}

impl<R: RemoteStore, O: ObjectStore> MessageLifecycleManager<R, O> {
    pub fn new(remote: Arc<R>, objects: Arc<O>, cache: Arc<Mutex<Database>>) -> Self {
        Self {
            remote,
            objects,
            cache,
        }
    }

    fn cache(&self) -> Result<MutexGuard<'_, Database>> {
        self.cache
            .lock()
            .map_err(|e| SyncError::Internal(format!("cache lock poisoned: {e}")))
    }

    /// Send a message into a chat and return its id.
    ///
    /// Exactly one of `text` / `attachment` must carry content. Passing
    /// `explicit_id` makes client-side retries idempotent: the local write
    /// is an upsert keyed on that id.
    ///
    /// The returned id does not wait for delivery status; only the commit
    /// itself is awaited. On a commit failure the local copy is marked
    /// `failed` with retry bookkeeping and the error is returned.
    pub async fn send_message(
        &self,
        chat_id: &str,
        sender_id: &str,
        text: Option<&str>,
        explicit_id: Option<&str>,
        attachment: Option<OutgoingAttachment>,
    ) -> Result<String> {
        let body = text.map(str::trim).filter(|t| !t.is_empty());
        match (body.is_some(), attachment.is_some()) {
            (true, true) => {
                return Err(SyncError::Validation(
                    "a message carries text or an attachment, not both".into(),
                ))
            }
            (false, false) => {
                return Err(SyncError::Validation("message has no content".into()))
            }
            _ => {}
        }

        let chat = self
            .remote
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("chat {chat_id}")))?;

        let id = explicit_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = Utc::now();

        let message = match attachment {
            Some(att) => {
                // The size gate runs before any upload.
                let prepared = prepare_image(&att.bytes)?;
                let image_path = format!("chats/{chat_id}/media/{id}.jpg");
                let thumb_path = format!("chats/{chat_id}/media/{id}_thumb.jpg");
                let image_url = self.objects.upload(&image_path, prepared.image_jpeg).await?;
                let thumbnail_url = self
                    .objects
                    .upload(&thumb_path, prepared.thumbnail_jpeg)
                    .await?;
                Message::image(
                    &id,
                    chat_id,
                    sender_id,
                    &image_url,
                    &thumbnail_url,
                    att.caption.as_deref(),
                    now,
                )
            }
            None => Message::text(&id, chat_id, sender_id, body.unwrap_or_default(), now),
        };

        // Local first: the message is visible offline regardless of how
        // the remote commit fares.
        {
            let cache = self.cache()?;
            cache.upsert_message(&message)?;
            cache.enqueue_outbound(&id, chat_id)?;
        }

        match self.commit_outbound(&chat.id, &message).await {
            Ok(()) => {
                info!(chat_id, message_id = %id, "message sent");
                Ok(id)
            }
            Err(e) => {
                warn!(chat_id, message_id = %id, error = %e, "message commit failed");
                let cache = self.cache()?;
                cache.mark_send_failed(&id, Utc::now())?;
                cache.update_message_status(&id, MessageStatus::Failed)?;
                Err(e)
            }
        }
    }

    /// Advance a message's delivery status.
    ///
    /// Regressions and step-skips are rejected with `InvalidTransition`
    /// (not silently normalized); `Failed -> Sending` is the accepted
    /// retry edge.
    pub async fn update_message_status(
        &self,
        chat_id: &str,
        message_id: &str,
        status: MessageStatus,
    ) -> Result<()> {
        let message = self.require_message(chat_id, message_id).await?;

        if !message.status.can_transition_to(status) {
            return Err(SyncError::InvalidTransition {
                from: message.status,
                to: status,
            });
        }

        let mut batch = WriteBatch::new();
        batch.push(Write::UpdateMessage {
            chat_id: chat_id.to_string(),
            message_id: message_id.to_string(),
            patch: MessagePatch {
                status: Some(status),
                ..MessagePatch::default()
            },
        });
        self.remote.commit(batch).await?;

        self.cache()?.update_message_status(message_id, status)?;
        debug!(chat_id, message_id, status = status.as_str(), "message status updated");
        Ok(())
    }

    /// Tombstone a message for everyone. Content is not erased, so clients
    /// that already fetched it can render a deletion placeholder.
    pub async fn delete_message_for_everyone(
        &self,
        chat_id: &str,
        message_id: &str,
    ) -> Result<()> {
        let message = self.require_message(chat_id, message_id).await?;
        if message.deleted_for_everyone {
            debug!(chat_id, message_id, "already deleted for everyone");
            return Ok(());
        }

        let mut batch = WriteBatch::new();
        batch.push(Write::UpdateMessage {
            chat_id: chat_id.to_string(),
            message_id: message_id.to_string(),
            patch: MessagePatch {
                deleted_for_everyone: Some(true),
                deleted_at: Some(Utc::now()),
                ..MessagePatch::default()
            },
        });
        self.remote.commit(batch).await?;

        self.cache()?.mark_message_deleted_for_everyone(message_id)?;
        info!(chat_id, message_id, "message deleted for everyone");
        Ok(())
    }

    /// Hide a message from one user only; other participants still see it.
    pub async fn delete_message_for_me(
        &self,
        chat_id: &str,
        message_id: &str,
        user_id: &str,
    ) -> Result<()> {
        let message = self.require_message(chat_id, message_id).await?;
        if message.deleted_for_me.contains(user_id) {
            return Ok(());
        }

        let mut deleted_for = message.deleted_for_me;
        deleted_for.insert(user_id.to_string());

        let mut batch = WriteBatch::new();
        batch.push(Write::UpdateMessage {
            chat_id: chat_id.to_string(),
            message_id: message_id.to_string(),
            patch: MessagePatch {
                deleted_for_me: Some(deleted_for),
                ..MessagePatch::default()
            },
        });
        self.remote.commit(batch).await?;

        self.cache()?.add_message_deleted_for_me(message_id, user_id)?;
        Ok(())
    }

    /// Add `user_id` under `emoji` on a message. Idempotent: reacting
    /// twice with the same pair changes nothing and writes nothing.
    pub async fn add_reaction(
        &self,
        chat_id: &str,
        message_id: &str,
        emoji: &str,
        user_id: &str,
    ) -> Result<()> {
        self.merge_reactions(chat_id, message_id, |reactions| {
            reactions
                .entry(emoji.to_string())
                .or_default()
                .insert(user_id.to_string())
        })
        .await
    }

    /// Remove `user_id` from under `emoji`. Removing an absent reaction is
    /// a no-op, not an error.
    pub async fn remove_reaction(
        &self,
        chat_id: &str,
        message_id: &str,
        emoji: &str,
        user_id: &str,
    ) -> Result<()> {
        self.merge_reactions(chat_id, message_id, |reactions| {
            match reactions.get_mut(emoji) {
                Some(users) => {
                    let removed = users.remove(user_id);
                    if users.is_empty() {
                        reactions.remove(emoji);
                    }
                    removed
                }
                None => false,
            }
        })
        .await
    }

    /// Re-commit a message whose previous commit failed.
    ///
    /// Takes the `Failed -> Sending` retry edge and runs the same commit
    /// as the original send.
    pub async fn retry_failed_message(&self, chat_id: &str, message_id: &str) -> Result<()> {
        let mut message = match self.cache()?.get_message(message_id) {
            Ok(m) => m,
            Err(StoreError::NotFound) => {
                return Err(SyncError::NotFound(format!("message {message_id}")))
            }
            Err(e) => return Err(e.into()),
        };

        if message.sync_status != SyncStatus::Failed {
            return Err(SyncError::Validation(format!(
                "message {message_id} is not in a failed state"
            )));
        }

        message.status = MessageStatus::Sending;
        message.sync_status = SyncStatus::Pending;
        self.cache()?
            .update_message_status(message_id, MessageStatus::Sending)?;

        match self.commit_outbound(chat_id, &message).await {
            Ok(()) => {
                info!(chat_id, message_id, "failed message re-sent");
                Ok(())
            }
            Err(e) => {
                let cache = self.cache()?;
                cache.mark_send_failed(message_id, Utc::now())?;
                cache.update_message_status(message_id, MessageStatus::Failed)?;
                Err(e)
            }
        }
    }

    /// Record that `user_id` has read the chat up to `message_id`: resets
    /// the participant's unread counter remotely and the local read state.
    pub async fn mark_chat_read(
        &self,
        chat_id: &str,
        user_id: &str,
        message_id: &str,
    ) -> Result<()> {
        let now = Utc::now();
        let mut batch = WriteBatch::new();
        batch.push(Write::UpdateParticipant {
            chat_id: chat_id.to_string(),
            user_id: user_id.to_string(),
            patch: ParticipantPatch {
                last_read_message_id: Some(message_id.to_string()),
                last_read_timestamp: Some(now),
                unread_count: Some(0),
                ..ParticipantPatch::default()
            },
        });
        self.remote.commit(batch).await?;

        let cache = self.cache()?;
        let scroll_y = cache
            .get_scroll_position(chat_id)?
            .map(|p| p.scroll_y_position)
            .unwrap_or(0.0);
        cache.upsert_scroll_position(&ScrollPosition {
            chat_id: chat_id.to_string(),
            last_read_message_id: Some(message_id.to_string()),
            scroll_y_position: scroll_y,
            unread_count: 0,
        })?;
        cache.set_chat_unread_count(chat_id, 0)?;
        Ok(())
    }

    /// Page through a chat's messages from the local cache (works offline).
    pub fn get_messages(
        &self,
        chat_id: &str,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<Vec<Message>> {
        Ok(self.cache()?.list_messages_for_chat(
            chat_id,
            limit.unwrap_or(DEFAULT_MESSAGE_PAGE),
            offset,
        )?)
    }

    /// Subscribe to remote message snapshots for a chat.
    pub fn subscribe_to_messages(
        &self,
        chat_id: &str,
        on_data: MessagesCallback,
        on_error: RemoteErrorCallback,
    ) -> Subscription {
        self.remote.subscribe_messages(chat_id, on_data, on_error)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn require_message(&self, chat_id: &str, message_id: &str) -> Result<Message> {
        self.remote
            .get_message(chat_id, message_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("message {chat_id}/{message_id}")))
    }

    /// The shared send/retry commit: the message document plus the parent
    /// chat's last-message summary, atomically.
    async fn commit_outbound(&self, chat_id: &str, message: &Message) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.push(Write::PutMessage(message.clone()));
        batch.push(Write::UpdateChat {
            chat_id: chat_id.to_string(),
            patch: ChatPatch {
                last_message_text: Some(message.summary_text()),
                last_message_time: Some(message.timestamp),
                last_message_sender_id: Some(message.sender_id.clone()),
                last_message_status: Some(message.status),
                ..ChatPatch::default()
            },
        });
        self.remote.commit(batch).await?;

        let cache = self.cache()?;
        cache.mark_synced(&message.id)?;
        cache.update_chat_last_message(
            chat_id,
            &message.summary_text(),
            message.timestamp,
            &message.sender_id,
            message.status,
        )?;
        Ok(())
    }

    /// Reaction writes never overwrite the whole map unconditionally: read
    /// the versioned document, merge, and conditionally write, retrying
    /// while rival commits invalidate the version. `mutate` returns false
    /// when the merge changed nothing, which short-circuits with no write.
    async fn merge_reactions<F>(
        &self,
        chat_id: &str,
        message_id: &str,
        mutate: F,
    ) -> Result<()>
    where
        F: Fn(&mut confab_shared::ReactionMap) -> bool,
    {
        for attempt in 0..REACTION_MERGE_ATTEMPTS {
            let (message, version) = self
                .remote
                .get_message_versioned(chat_id, message_id)
                .await?
                .ok_or_else(|| {
                    SyncError::NotFound(format!("message {chat_id}/{message_id}"))
                })?;

            let mut merged = message.reactions.clone();
            if !mutate(&mut merged) {
                return Ok(());
            }

            match self
                .remote
                .update_message_reactions(chat_id, message_id, version, merged.clone())
                .await?
            {
                CasOutcome::Applied => {
                    self.cache()?.set_message_reactions(message_id, &merged)?;
                    return Ok(());
                }
                CasOutcome::VersionMismatch => {
                    debug!(chat_id, message_id, attempt, "reaction version mismatch, retrying");
                }
            }
        }

        Err(SyncError::Conflict(
            "reaction update kept losing the version race".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use confab_shared::constants::MAX_IMAGE_BYTES;
    use confab_shared::{Chat, ChatKind, ChatParticipant, MediaError, ParticipantRole};

    use crate::testing::{memory_cache, MemoryObjects, MemoryRemote};

    type Manager = MessageLifecycleManager<MemoryRemote, MemoryObjects>;

    async fn manager() -> (Arc<MemoryRemote>, Arc<MemoryObjects>, Manager) {
        let remote = Arc::new(MemoryRemote::new());
        let objects = Arc::new(MemoryObjects::new());
        let mgr = MessageLifecycleManager::new(
            Arc::clone(&remote),
            Arc::clone(&objects),
            memory_cache(),
        );
        seed_chat(&remote, "c1", &["u1", "u2"]).await;
        // Mirror the chat locally so cache updates have a row to land on.
        mgr.cache().unwrap().upsert_chat(&remote.chat("c1").unwrap()).unwrap();
        (remote, objects, mgr)
    }

    async fn seed_chat(remote: &MemoryRemote, chat_id: &str, users: &[&str]) {
        let now = Utc::now();
        let chat = Chat {
            id: chat_id.to_string(),
            kind: ChatKind::OneOnOne,
            participants: users.iter().map(|u| u.to_string()).collect(),
            created_at: now,
            created_by: users[0].to_string(),
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
        batch.push(Write::PutChat(chat));
        for user in users {
            batch.push(Write::PutParticipant(ChatParticipant::new(
                chat_id,
                user,
                ParticipantRole::Member,
                now,
            )));
        }
        remote.commit(batch).await.unwrap();
    }

    fn png_bytes() -> Vec<u8> {
        use image::{ImageBuffer, Rgb};
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(64, 48, |x, y| Rgb([x as u8, y as u8, 7]));
        let mut buf = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buf);
        img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
        buf
    }

    #[tokio::test]
    async fn send_text_commits_and_mirrors() {
        let (remote, _, mgr) = manager().await;

        let id = mgr
            .send_message("c1", "u1", Some("hello"), None, None)
            .await
            .unwrap();

        let remote_msg = remote.message("c1", &id).unwrap();
        assert_eq!(remote_msg.status, MessageStatus::Sending);
        assert_eq!(remote_msg.text.as_deref(), Some("hello"));

        let local = mgr.cache().unwrap().get_message(&id).unwrap();
        assert_eq!(local.sync_status, SyncStatus::Synced);

        let chat = remote.chat("c1").unwrap();
        assert_eq!(chat.last_message_text.as_deref(), Some("hello"));
        assert_eq!(chat.last_message_sender_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn explicit_id_is_used_verbatim() {
        let (remote, _, mgr) = manager().await;
        let id = mgr
            .send_message("c1", "u1", Some("hi"), Some("stable-id"), None)
            .await
            .unwrap();
        assert_eq!(id, "stable-id");
        assert!(remote.message("c1", "stable-id").is_some());
    }

    #[tokio::test]
    async fn content_validation() {
        let (_, _, mgr) = manager().await;

        let err = mgr
            .send_message("c1", "u1", None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));

        let err = mgr
            .send_message(
                "c1",
                "u1",
                Some("text"),
                None,
                Some(OutgoingAttachment {
                    bytes: png_bytes(),
                    caption: None,
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));

        // Whitespace-only text is no content.
        let err = mgr
            .send_message("c1", "u1", Some("   "), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[tokio::test]
    async fn image_send_uploads_two_artifacts() {
        let (remote, objects, mgr) = manager().await;

        let id = mgr
            .send_message(
                "c1",
                "u1",
                None,
                None,
                Some(OutgoingAttachment {
                    bytes: png_bytes(),
                    caption: Some("sunset".into()),
                }),
            )
            .await
            .unwrap();

        assert_eq!(objects.upload_count(), 2);
        let msg = remote.message("c1", &id).unwrap();
        assert!(msg.image_url.as_deref().unwrap().starts_with("mem://"));
        assert!(msg.thumbnail_url.is_some());
        assert!(msg.text.is_none());
        assert_eq!(remote.chat("c1").unwrap().last_message_text.as_deref(), Some("sunset"));
    }

    #[tokio::test]
    async fn oversized_attachment_rejected_before_any_upload() {
        let (_, objects, mgr) = manager().await;

        let err = mgr
            .send_message(
                "c1",
                "u1",
                None,
                None,
                Some(OutgoingAttachment {
                    bytes: vec![0u8; MAX_IMAGE_BYTES + 1],
                    caption: None,
                }),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Media(MediaError::TooLarge { .. })));
        assert_eq!(objects.upload_count(), 0);
    }

    #[tokio::test]
    async fn failed_commit_marks_local_and_retry_recovers() {
        let (remote, _, mgr) = manager().await;
        remote.fail_next_commits(1);

        let err = mgr
            .send_message("c1", "u1", Some("doomed"), Some("m-retry"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Transient(_)));

        {
            let cache = mgr.cache().unwrap();
            let local = cache.get_message("m-retry").unwrap();
            assert_eq!(local.sync_status, SyncStatus::Failed);
            assert_eq!(local.status, MessageStatus::Failed);

            let entry = cache.get_outbound("m-retry").unwrap().unwrap();
            assert_eq!(entry.retry_count, 1);
            assert!(entry.last_attempt.is_some());
        }

        mgr.retry_failed_message("c1", "m-retry").await.unwrap();

        let local = mgr.cache().unwrap().get_message("m-retry").unwrap();
        assert_eq!(local.sync_status, SyncStatus::Synced);
        assert_eq!(local.status, MessageStatus::Sending);
        assert!(remote.message("c1", "m-retry").is_some());
    }

    #[tokio::test]
    async fn retry_of_healthy_message_is_rejected() {
        let (_, _, mgr) = manager().await;
        let id = mgr
            .send_message("c1", "u1", Some("fine"), None, None)
            .await
            .unwrap();

        let err = mgr.retry_failed_message("c1", &id).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[tokio::test]
    async fn status_skips_and_regressions_rejected() {
        let (_, _, mgr) = manager().await;
        let id = mgr
            .send_message("c1", "u1", Some("x"), None, None)
            .await
            .unwrap();

        // Direct sending -> delivered skips a step.
        let err = mgr
            .update_message_status("c1", &id, MessageStatus::Delivered)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidTransition { .. }));

        mgr.update_message_status("c1", &id, MessageStatus::Sent)
            .await
            .unwrap();
        mgr.update_message_status("c1", &id, MessageStatus::Delivered)
            .await
            .unwrap();
        mgr.update_message_status("c1", &id, MessageStatus::Read)
            .await
            .unwrap();

        // read -> sent is a regression.
        let err = mgr
            .update_message_status("c1", &id, MessageStatus::Sent)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn failed_to_sending_is_accepted() {
        let (remote, _, mgr) = manager().await;
        let id = mgr
            .send_message("c1", "u1", Some("x"), None, None)
            .await
            .unwrap();
        mgr.update_message_status("c1", &id, MessageStatus::Failed)
            .await
            .unwrap();

        mgr.update_message_status("c1", &id, MessageStatus::Sending)
            .await
            .unwrap();
        assert_eq!(remote.message("c1", &id).unwrap().status, MessageStatus::Sending);
    }

    #[tokio::test]
    async fn reaction_is_idempotent() {
        let (remote, _, mgr) = manager().await;
        let id = mgr
            .send_message("c1", "u1", Some("x"), None, None)
            .await
            .unwrap();

        mgr.add_reaction("c1", &id, "\u{1F44D}", "u2").await.unwrap();
        mgr.add_reaction("c1", &id, "\u{1F44D}", "u2").await.unwrap();

        let msg = remote.message("c1", &id).unwrap();
        assert_eq!(msg.reactions["\u{1F44D}"].len(), 1);
    }

    #[tokio::test]
    async fn two_reactors_both_survive() {
        let (remote, _, mgr) = manager().await;
        let id = mgr
            .send_message("c1", "u1", Some("x"), None, None)
            .await
            .unwrap();

        mgr.add_reaction("c1", &id, "\u{1F389}", "u1").await.unwrap();
        mgr.add_reaction("c1", &id, "\u{1F389}", "u2").await.unwrap();

        let msg = remote.message("c1", &id).unwrap();
        assert_eq!(msg.reactions["\u{1F389}"].len(), 2);
    }

    #[tokio::test]
    async fn concurrent_reaction_is_not_lost() {
        let (remote, _, mgr) = manager().await;
        let id = mgr
            .send_message("c1", "u1", Some("x"), None, None)
            .await
            .unwrap();

        // A rival reaction lands between our read and our write; the merge
        // loop must retry and preserve both.
        remote.inject_reaction_conflict("c1", &id, "\u{1F44D}", "u2");
        mgr.add_reaction("c1", &id, "\u{1F44D}", "u1").await.unwrap();

        let msg = remote.message("c1", &id).unwrap();
        let users = &msg.reactions["\u{1F44D}"];
        assert!(users.contains("u1"), "our reaction was dropped");
        assert!(users.contains("u2"), "rival reaction was overwritten");
    }

    #[tokio::test]
    async fn removing_absent_reaction_is_noop() {
        let (remote, _, mgr) = manager().await;
        let id = mgr
            .send_message("c1", "u1", Some("x"), None, None)
            .await
            .unwrap();

        mgr.remove_reaction("c1", &id, "\u{1F44D}", "u2").await.unwrap();
        assert!(remote.message("c1", &id).unwrap().reactions.is_empty());

        mgr.add_reaction("c1", &id, "\u{1F44D}", "u2").await.unwrap();
        mgr.remove_reaction("c1", &id, "\u{1F44D}", "u2").await.unwrap();
        // Emptied emoji entries are dropped entirely.
        assert!(remote.message("c1", &id).unwrap().reactions.is_empty());
    }

    #[tokio::test]
    async fn delete_for_everyone_leaves_tombstone() {
        let (remote, _, mgr) = manager().await;
        let id = mgr
            .send_message("c1", "u1", Some("secret"), None, None)
            .await
            .unwrap();

        mgr.delete_message_for_everyone("c1", &id).await.unwrap();

        let msg = remote.message("c1", &id).unwrap();
        assert!(msg.deleted_for_everyone);
        assert!(msg.deleted_at.is_some());
        // Content survives for tombstone rendering.
        assert_eq!(msg.text.as_deref(), Some("secret"));

        let local = mgr.cache().unwrap().get_message(&id).unwrap();
        assert!(local.deleted_for_everyone);
    }

    #[tokio::test]
    async fn delete_for_me_is_per_user() {
        let (remote, _, mgr) = manager().await;
        let id = mgr
            .send_message("c1", "u1", Some("x"), None, None)
            .await
            .unwrap();

        mgr.delete_message_for_me("c1", &id, "u2").await.unwrap();
        mgr.delete_message_for_me("c1", &id, "u2").await.unwrap();

        let msg = remote.message("c1", &id).unwrap();
        assert!(msg.deleted_for_me.contains("u2"));
        assert!(!msg.deleted_for_everyone);
    }

    #[tokio::test]
    async fn mark_chat_read_resets_counters() {
        let (remote, _, mgr) = manager().await;
        let id = mgr
            .send_message("c1", "u1", Some("x"), None, None)
            .await
            .unwrap();

        mgr.mark_chat_read("c1", "u2", &id).await.unwrap();

        let participant = remote.participant("c1", "u2").unwrap();
        assert_eq!(participant.last_read_message_id.as_deref(), Some(id.as_str()));
        assert_eq!(participant.unread_count, 0);

        let cache = mgr.cache().unwrap();
        let scroll = cache.get_scroll_position("c1").unwrap().unwrap();
        assert_eq!(scroll.last_read_message_id.as_deref(), Some(id.as_str()));
        assert_eq!(scroll.unread_count, 0);
    }

    #[tokio::test]
    async fn local_pages_survive_offline() {
        let (_, _, mgr) = manager().await;
        for i in 0..3 {
            mgr.send_message("c1", "u1", Some(&format!("msg {i}")), None, None)
                .await
                .unwrap();
        }

        let page = mgr.get_messages("c1", Some(2), 0).unwrap();
        assert_eq!(page.len(), 2);
        let rest = mgr.get_messages("c1", Some(2), 2).unwrap();
        assert_eq!(rest.len(), 1);
    }

    #[tokio::test]
    async fn subscription_delivers_until_unsubscribed() {
        let (_, _, mgr) = manager().await;
        let seen = Arc::new(Mutex::new(Vec::<usize>::new()));

        let seen_cb = Arc::clone(&seen);
        let sub = mgr.subscribe_to_messages(
            "c1",
            Arc::new(move |messages| {
                seen_cb.lock().unwrap().push(messages.len());
            }),
            Arc::new(|_| {}),
        );

        mgr.send_message("c1", "u1", Some("one"), None, None)
            .await
            .unwrap();
        assert!(!seen.lock().unwrap().is_empty());

        sub.unsubscribe();
        let count = seen.lock().unwrap().len();
        mgr.send_message("c1", "u1", Some("two"), None, None)
            .await
            .unwrap();
        assert_eq!(seen.lock().unwrap().len(), count);
    }
}
