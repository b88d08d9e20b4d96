//! CRUD operations for mirrored [`Chat`] records.

use chrono::{DateTime, Utc};
use rusqlite::params;

use confab_shared::{Chat, ChatKind, MessageStatus};

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    // ------------------------------------------------------------------
    // Create / update
    // ------------------------------------------------------------------

    /// Insert or update the local mirror of a chat document.
    ///
    /// Not `INSERT OR REPLACE`: the replace path deletes the old row first,
    /// which would cascade away the chat's cached messages.
    pub fn upsert_chat(&self, chat: &Chat) -> Result<()> {
        let participants = serde_json::to_string(&chat.participants)?;
        self.conn().execute(
            "INSERT INTO chats (
                id, type, participants,
                lastMessageText, lastMessageTime, lastMessageSenderId, lastMessageStatus,
                unreadCount, groupName, groupIcon, groupDescription, groupAdminId,
                inviteCode, createdAt, createdBy)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(id) DO UPDATE SET
                type = excluded.type,
                participants = excluded.participants,
                lastMessageText = excluded.lastMessageText,
                lastMessageTime = excluded.lastMessageTime,
                lastMessageSenderId = excluded.lastMessageSenderId,
                lastMessageStatus = excluded.lastMessageStatus,
                unreadCount = excluded.unreadCount,
                groupName = excluded.groupName,
                groupIcon = excluded.groupIcon,
                groupDescription = excluded.groupDescription,
                groupAdminId = excluded.groupAdminId,
                inviteCode = excluded.inviteCode,
                createdAt = excluded.createdAt,
                createdBy = excluded.createdBy",
            params![
                chat.id,
                chat.kind.as_str(),
                participants,
                chat.last_message_text,
                chat.last_message_time.map(|t| t.to_rfc3339()),
                chat.last_message_sender_id,
                chat.last_message_status.map(|s| s.as_str()),
                chat.unread_count,
                chat.group_name,
                chat.group_icon,
                chat.group_description,
                chat.group_admin_id,
                chat.invite_code,
                chat.created_at.to_rfc3339(),
                chat.created_by,
            ],
        )?;
        Ok(())
    }

    /// Update only the denormalized last-message summary of a chat.
    pub fn update_chat_last_message(
        &self,
        chat_id: &str,
        text: &str,
        time: DateTime<Utc>,
        sender_id: &str,
        status: MessageStatus,
    ) -> Result<()> {
        self.conn().execute(
            "UPDATE chats
             SET lastMessageText = ?2, lastMessageTime = ?3,
                 lastMessageSenderId = ?4, lastMessageStatus = ?5
             WHERE id = ?1",
            params![chat_id, text, time.to_rfc3339(), sender_id, status.as_str()],
        )?;
        Ok(())
    }

    /// Set the locally aggregated unread count for a chat.
    pub fn set_chat_unread_count(&self, chat_id: &str, unread: i64) -> Result<()> {
        self.conn().execute(
            "UPDATE chats SET unreadCount = ?2 WHERE id = ?1",
            params![chat_id, unread],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single chat by id.
    pub fn get_chat(&self, id: &str) -> Result<Chat> {
        self.conn()
            .query_row(
                &format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = ?1"),
                params![id],
                row_to_chat,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List all chats, most recently active first.
    pub fn list_chats(&self) -> Result<Vec<Chat>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats
             ORDER BY lastMessageTime IS NULL, lastMessageTime DESC, createdAt DESC"
        ))?;

        let rows = stmt.query_map([], row_to_chat)?;

        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a chat by id. Messages, scroll positions, and queued outbound
    /// entries cascade. Returns `true` if a row was deleted.
    pub fn delete_chat(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM chats WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const CHAT_COLUMNS: &str = "id, type, participants, \
     lastMessageText, lastMessageTime, lastMessageSenderId, lastMessageStatus, \
     unreadCount, groupName, groupIcon, groupDescription, groupAdminId, \
     inviteCode, createdAt, createdBy";

/// Map a `rusqlite::Row` to a [`Chat`].
fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    let kind_str: String = row.get(1)?;
    let participants_json: String = row.get(2)?;
    let last_time_str: Option<String> = row.get(4)?;
    let last_status_str: Option<String> = row.get(6)?;
    let created_str: String = row.get(13)?;

    let kind = ChatKind::parse(&kind_str)
        .ok_or_else(|| text_conversion_err(1, format!("unknown chat type: {kind_str}")))?;

    let participants: Vec<String> = serde_json::from_str(&participants_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e)))?;

    let last_message_time = last_time_str.as_deref().map(parse_ts).transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e)))?;

    let last_message_status = match last_status_str {
        Some(s) => Some(
            MessageStatus::parse(&s)
                .ok_or_else(|| text_conversion_err(6, format!("unknown status: {s}")))?,
        ),
        None => None,
    };

    let created_at = parse_ts(&created_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(13, rusqlite::types::Type::Text, Box::new(e)))?;

    Ok(Chat {
        id: row.get(0)?,
        kind,
        participants,
        last_message_text: row.get(3)?,
        last_message_time,
        last_message_sender_id: row.get(5)?,
        last_message_status,
        unread_count: row.get(7)?,
        group_name: row.get(8)?,
        group_icon: row.get(9)?,
        group_description: row.get(10)?,
        group_admin_id: row.get(11)?,
        invite_code: row.get(12)?,
        created_at,
        created_by: row.get(14)?,
        updated_at: None,
    })
}

pub(crate) fn parse_ts(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn text_conversion_err(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        msg.into(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use confab_shared::ChatKind;

    fn group_chat(id: &str) -> Chat {
        Chat {
            id: id.to_string(),
            kind: ChatKind::Group,
            participants: vec!["u1".into(), "u2".into()],
            created_at: Utc::now(),
            created_by: "u1".to_string(),
            last_message_text: None,
            last_message_time: None,
            last_message_sender_id: None,
            last_message_status: None,
            unread_count: 0,
            group_name: Some("G".into()),
            group_description: None,
            group_icon: None,
            group_admin_id: Some("u1".into()),
            invite_code: Some("abc123".into()),
            updated_at: None,
        }
    }

    #[test]
    fn upsert_get_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let chat = group_chat("c1");
        db.upsert_chat(&chat).unwrap();

        let loaded = db.get_chat("c1").unwrap();
        assert_eq!(loaded.participants, chat.participants);
        assert_eq!(loaded.group_admin_id.as_deref(), Some("u1"));
        assert_eq!(loaded.kind, ChatKind::Group);
    }

    #[test]
    fn missing_chat_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.get_chat("nope"), Err(StoreError::NotFound)));
    }

    #[test]
    fn delete_cascades_to_messages() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_chat(&group_chat("c1")).unwrap();

        let msg = confab_shared::Message::text("m1", "c1", "u1", "hi", Utc::now());
        db.insert_message(&msg).unwrap();

        assert!(db.delete_chat("c1").unwrap());
        assert!(db.list_messages_for_chat("c1", 10, 0).unwrap().is_empty());
    }
}
