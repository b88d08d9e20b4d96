//! Group membership coordination: creation, invite-code joins, member
//! management, and deterministic admin transfer.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use confab_shared::constants::INVITE_CODE_ATTEMPTS;
use confab_shared::invite::{generate_invite_code, is_well_formed_code};
use confab_shared::{Chat, ChatKind, ChatParticipant, ParticipantRole};
use confab_store::Database;

use crate::error::{Result, SyncError};
use crate::remote::{ChatPatch, ParticipantPatch, RemoteStore, Write, WriteBatch};

/// Partial update for [`GroupMembershipCoordinator::update_group_info`];
/// only supplied fields are written.
#[derive(Debug, Clone, Default)]
pub struct GroupInfoPatch {
    pub group_name: Option<String>,
    pub group_description: Option<String>,
    pub group_icon: Option<String>,
}

/// Coordinates group chat membership against the remote store.
///
/// Every mutation is a single atomic commit; the local cache is updated
/// only after the commit succeeds.
pub struct GroupMembershipCoordinator<R: RemoteStore> {
    remote: Arc<R>,
    cache: Arc<Mutex<Database>>,
}

impl<R: RemoteStore> GroupMembershipCoordinator<R> {
    pub fn new(remote: Arc<R>, cache: Arc<Mutex<Database>>) -> Self {
        Self { remote, cache }
    }

    fn cache(&self) -> Result<MutexGuard<'_, Database>> {
        self.cache
            .lock()
            .map_err(|e| SyncError::Internal(format!("cache lock poisoned: {e}")))
    }

    /// Create a group chat in one atomic commit: the chat document plus
    /// one participant record per member, the creator as admin.
    ///
    /// Participants are `{creator} ∪ member_ids` with set semantics; a
    /// duplicated creator collapses.
    pub async fn create_group(
        &self,
        name: &str,
        description: Option<&str>,
        icon: Option<&str>,
        creator_id: &str,
        member_ids: &[String],
    ) -> Result<Chat> {
        if name.trim().is_empty() {
            return Err(SyncError::Validation("group name is required".into()));
        }
        if member_ids.is_empty() {
            return Err(SyncError::Validation(
                "a group needs at least one member".into(),
            ));
        }

        let mut participants = vec![creator_id.to_string()];
        for member in member_ids {
            if !participants.contains(member) {
                participants.push(member.clone());
            }
        }

        let invite_code = self.mint_unique_code(None).await?;
        let now = Utc::now();
        let chat = Chat {
            id: Uuid::new_v4().to_string(),
            kind: ChatKind::Group,
            participants: participants.clone(),
            created_at: now,
            created_by: creator_id.to_string(),
            last_message_text: None,
            last_message_time: None,
            last_message_sender_id: None,
            last_message_status: None,
            unread_count: 0,
            group_name: Some(name.to_string()),
            group_description: description.map(str::to_string),
            group_icon: icon.map(str::to_string),
            group_admin_id: Some(creator_id.to_string()),
            invite_code: Some(invite_code),
            updated_at: None,
        };

        let mut batch = WriteBatch::new();
        batch.push(Write::PutChat(chat.clone()));
        for user_id in &participants {
            let role = if user_id == creator_id {
                ParticipantRole::Admin
            } else {
                ParticipantRole::Member
            };
            batch.push(Write::PutParticipant(ChatParticipant::new(
                &chat.id, user_id, role, now,
            )));
        }

        self.remote.commit(batch).await?;
        self.cache()?.upsert_chat(&chat)?;

        info!(chat_id = %chat.id, members = participants.len(), "group created");
        Ok(chat)
    }

    /// Partial update of group name/description/icon. No membership side
    /// effects.
    pub async fn update_group_info(&self, chat_id: &str, info: GroupInfoPatch) -> Result<()> {
        let chat = self.require_group(chat_id).await?;

        let patch = ChatPatch {
            group_name: info.group_name,
            group_description: info.group_description,
            group_icon: info.group_icon,
            updated_at: Some(Utc::now()),
            ..ChatPatch::default()
        };

        let mut batch = WriteBatch::new();
        batch.push(Write::UpdateChat {
            chat_id: chat_id.to_string(),
            patch: patch.clone(),
        });
        self.remote.commit(batch).await?;

        let mut updated = chat;
        patch.apply(&mut updated);
        self.cache()?.upsert_chat(&updated)?;
        Ok(())
    }

    /// Add a member to a group. Adding a user who is already a member is
    /// an idempotent no-op: no write is performed and no error raised.
    pub async fn add_member(&self, chat_id: &str, user_id: &str) -> Result<()> {
        let chat = self.require_group(chat_id).await?;

        if chat.has_participant(user_id) {
            debug!(chat_id, user_id, "add_member: already a member, skipping");
            return Ok(());
        }

        self.commit_member_add(&chat, user_id).await?;
        Ok(())
    }

    /// Leave a group. One atomic commit covers the membership removal and
    /// whichever consequence applies:
    ///
    /// - the leaver was admin and members remain: admin transfers to the
    ///   remaining participant with the earliest `joined_at`, ties broken
    ///   by ascending `user_id`;
    /// - the leaver was the last participant: the chat document and any
    ///   remaining participant records are deleted.
    pub async fn leave_group(&self, chat_id: &str, user_id: &str) -> Result<()> {
        let chat = self.require_group(chat_id).await?;
        if !chat.has_participant(user_id) {
            return Err(SyncError::NotFound(format!(
                "user {user_id} is not a member of chat {chat_id}"
            )));
        }

        let remaining: Vec<String> = chat
            .participants
            .iter()
            .filter(|p| *p != user_id)
            .cloned()
            .collect();

        let mut batch = WriteBatch::new();
        batch.push(Write::DeleteParticipant {
            chat_id: chat_id.to_string(),
            user_id: user_id.to_string(),
        });

        if remaining.is_empty() {
            batch.push(Write::DeleteChat {
                chat_id: chat_id.to_string(),
            });
            self.remote.commit(batch).await?;
            self.cache()?.delete_chat(chat_id)?;
            info!(chat_id, user_id, "last participant left, chat deleted");
            return Ok(());
        }

        let was_admin = chat.group_admin_id.as_deref() == Some(user_id);
        let successor = if was_admin {
            let records = self.remote.get_participants(chat_id).await?;
            Some(choose_successor(&records, user_id).ok_or_else(|| {
                SyncError::Internal(format!(
                    "chat {chat_id} has remaining participants but no candidate records"
                ))
            })?)
        } else {
            None
        };

        let mut patch = ChatPatch {
            participants: Some(remaining.clone()),
            ..ChatPatch::default()
        };
        if let Some(successor_id) = &successor {
            patch.group_admin_id = Some(successor_id.clone());
            batch.push(Write::UpdateParticipant {
                chat_id: chat_id.to_string(),
                user_id: successor_id.clone(),
                patch: ParticipantPatch {
                    role: Some(ParticipantRole::Admin),
                    ..ParticipantPatch::default()
                },
            });
        }
        batch.push(Write::UpdateChat {
            chat_id: chat_id.to_string(),
            patch: patch.clone(),
        });

        self.remote.commit(batch).await?;

        let mut updated = chat;
        patch.apply(&mut updated);
        self.cache()?.upsert_chat(&updated)?;

        match successor {
            Some(successor_id) => {
                info!(chat_id, user_id, successor = %successor_id, "admin left, role transferred")
            }
            None => debug!(chat_id, user_id, "member left group"),
        }
        Ok(())
    }

    /// Join a group via its invite code.
    ///
    /// Fails `NotFound` for an unknown code and `Conflict` when the user
    /// is already a member, so the UI can tell the two apart.
    pub async fn join_group_by_invite_code(&self, code: &str, user_id: &str) -> Result<Chat> {
        // Syntactic gate first; saves a remote lookup on garbage input.
        if !is_well_formed_code(code) {
            return Err(SyncError::NotFound("invalid invite code".into()));
        }

        let chat = self
            .remote
            .find_chat_by_invite_code(code)
            .await?
            .ok_or_else(|| SyncError::NotFound("invalid invite code".into()))?;

        if chat.has_participant(user_id) {
            return Err(SyncError::Conflict("already a member".into()));
        }

        let updated = self.commit_member_add(&chat, user_id).await?;
        info!(chat_id = %updated.id, user_id, "joined group via invite code");
        Ok(updated)
    }

    /// Replace the group's invite code. The old code becomes unusable the
    /// moment the commit lands.
    pub async fn regenerate_invite_code(&self, chat_id: &str) -> Result<String> {
        let chat = self.require_group(chat_id).await?;
        let code = self.mint_unique_code(chat.invite_code.as_deref()).await?;

        let patch = ChatPatch {
            invite_code: Some(code.clone()),
            ..ChatPatch::default()
        };
        let mut batch = WriteBatch::new();
        batch.push(Write::UpdateChat {
            chat_id: chat_id.to_string(),
            patch: patch.clone(),
        });
        self.remote.commit(batch).await?;

        let mut updated = chat;
        patch.apply(&mut updated);
        self.cache()?.upsert_chat(&updated)?;

        info!(chat_id, "invite code regenerated");
        Ok(code)
    }

    /// All participant records for a chat in a deterministic order:
    /// admins first, then ascending join time, then ascending user id.
    pub async fn get_group_participants(&self, chat_id: &str) -> Result<Vec<ChatParticipant>> {
        let mut records = self.remote.get_participants(chat_id).await?;
        records.sort_by(|a, b| {
            role_rank(a.role)
                .cmp(&role_rank(b.role))
                .then(a.joined_at.cmp(&b.joined_at))
                .then(a.user_id.cmp(&b.user_id))
        });
        Ok(records)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn require_group(&self, chat_id: &str) -> Result<Chat> {
        let chat = self
            .remote
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("chat {chat_id}")))?;
        if !chat.is_group() {
            return Err(SyncError::Validation(format!(
                "chat {chat_id} is not a group"
            )));
        }
        Ok(chat)
    }

    /// One atomic commit adding a participant record and appending the
    /// user to the chat's participant set. Returns the updated chat.
    async fn commit_member_add(&self, chat: &Chat, user_id: &str) -> Result<Chat> {
        let mut participants = chat.participants.clone();
        participants.push(user_id.to_string());

        let patch = ChatPatch {
            participants: Some(participants),
            ..ChatPatch::default()
        };
        let mut batch = WriteBatch::new();
        batch.push(Write::PutParticipant(ChatParticipant::new(
            &chat.id,
            user_id,
            ParticipantRole::Member,
            Utc::now(),
        )));
        batch.push(Write::UpdateChat {
            chat_id: chat.id.clone(),
            patch: patch.clone(),
        });

        self.remote.commit(batch).await?;

        let mut updated = chat.clone();
        patch.apply(&mut updated);
        self.cache()?.upsert_chat(&updated)?;
        Ok(updated)
    }

    /// Mint an invite code that maps to no existing chat, re-rolling on a
    /// collision. Exhaustion is practically unreachable with 72 random
    /// bits per code.
    async fn mint_unique_code(&self, avoid: Option<&str>) -> Result<String> {
        for _ in 0..INVITE_CODE_ATTEMPTS {
            let code = generate_invite_code();
            if Some(code.as_str()) == avoid {
                continue;
            }
            if self.remote.find_chat_by_invite_code(&code).await?.is_none() {
                return Ok(code);
            }
            debug!("invite code collision, re-rolling");
        }
        Err(SyncError::Conflict(
            "could not mint a unique invite code".into(),
        ))
    }
}

/// The deterministic admin-succession rule: earliest `joined_at` wins,
/// exactly-equal timestamps fall back to ascending lexical user id.
fn choose_successor(records: &[ChatParticipant], leaver_id: &str) -> Option<String> {
    records
        .iter()
        .filter(|r| r.user_id != leaver_id)
        .min_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then(a.user_id.cmp(&b.user_id))
        })
        .map(|r| r.user_id.clone())
}

fn role_rank(role: ParticipantRole) -> u8 {
    match role {
        ParticipantRole::Admin => 0,
        ParticipantRole::Member => 1,
    }
}
