use std::collections::BTreeSet;

use rusqlite::params;

use confab_shared::{Message, MessageKind, MessageStatus, ReactionMap, SyncStatus};

use crate::chats::{parse_ts, text_conversion_err};
use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    /// Insert a new message. Fails if the id already exists.
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.write_message(message, "")
    }

    /// Insert or update the local mirror of a message document.
    ///
    /// `ON CONFLICT DO UPDATE` rather than `INSERT OR REPLACE`: the replace
    /// path deletes the old row, which would cascade away the message's
    /// outbound-queue entry.
    pub fn upsert_message(&self, message: &Message) -> Result<()> {
        self.write_message(
            message,
            " ON CONFLICT(id) DO UPDATE SET
                chatId = excluded.chatId,
                senderId = excluded.senderId,
                text = excluded.text,
                timestamp = excluded.timestamp,
                status = excluded.status,
                type = excluded.type,
                imageUrl = excluded.imageUrl,
                thumbnailUrl = excluded.thumbnailUrl,
                caption = excluded.caption,
                reactions = excluded.reactions,
                deletedForMe = excluded.deletedForMe,
                deletedForEveryone = excluded.deletedForEveryone,
                translations = excluded.translations,
                detectedLanguage = excluded.detectedLanguage,
                syncStatus = excluded.syncStatus",
        )
    }

    fn write_message(&self, message: &Message, on_conflict: &str) -> Result<()> {
        let reactions = serde_json::to_string(&message.reactions)?;
        let deleted_for_me = serde_json::to_string(&message.deleted_for_me)?;
        let translations = serde_json::to_string(&message.translations)?;

        self.conn().execute(
            &format!(
                "INSERT INTO messages (
                    id, chatId, senderId, text, timestamp, status, type,
                    imageUrl, thumbnailUrl, caption, reactions, deletedForMe,
                    deletedForEveryone, translations, detectedLanguage, syncStatus)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16){on_conflict}"
            ),
            params![
                message.id,
                message.chat_id,
                message.sender_id,
                message.text,
                message.timestamp.to_rfc3339(),
                message.status.as_str(),
                message.kind.as_str(),
                message.image_url,
                message.thumbnail_url,
                message.caption,
                reactions,
                deleted_for_me,
                message.deleted_for_everyone as i64,
                translations,
                message.detected_language,
                message.sync_status.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn get_message(&self, id: &str) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List messages for a chat, newest first.
    pub fn list_messages_for_chat(
        &self,
        chat_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE chatId = ?1
             ORDER BY timestamp DESC
             LIMIT ?2 OFFSET ?3"
        ))?;

        let rows = stmt.query_map(params![chat_id, limit, offset], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn update_message_status(&self, id: &str, status: MessageStatus) -> Result<()> {
        self.conn().execute(
            "UPDATE messages SET status = ?2 WHERE id = ?1",
            params![id, status.as_str()],
        )?;
        Ok(())
    }

    pub fn set_message_sync_status(&self, id: &str, sync_status: SyncStatus) -> Result<()> {
        self.conn().execute(
            "UPDATE messages SET syncStatus = ?2 WHERE id = ?1",
            params![id, sync_status.as_str()],
        )?;
        Ok(())
    }

    /// Replace the reactions column with a fresh snapshot.
    pub fn set_message_reactions(&self, id: &str, reactions: &ReactionMap) -> Result<()> {
        let json = serde_json::to_string(reactions)?;
        self.conn().execute(
            "UPDATE messages SET reactions = ?2 WHERE id = ?1",
            params![id, json],
        )?;
        Ok(())
    }

    /// Add a user to a message's deleted-for-me set.
    pub fn add_message_deleted_for_me(&self, id: &str, user_id: &str) -> Result<()> {
        let message = self.get_message(id)?;
        let mut set = message.deleted_for_me;
        if !set.insert(user_id.to_string()) {
            return Ok(());
        }
        let json = serde_json::to_string(&set)?;
        self.conn().execute(
            "UPDATE messages SET deletedForMe = ?2 WHERE id = ?1",
            params![id, json],
        )?;
        Ok(())
    }

    /// Mark a message deleted for everyone (tombstone; the row is kept).
    ///
    /// The deletion timestamp stays on the remote document; locally the
    /// tombstone flag is all the UI renders from.
    pub fn mark_message_deleted_for_everyone(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE messages SET deletedForEveryone = 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    pub fn delete_message(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM messages WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

const MESSAGE_COLUMNS: &str = "id, chatId, senderId, text, timestamp, status, type, \
     imageUrl, thumbnailUrl, caption, reactions, deletedForMe, \
     deletedForEveryone, translations, detectedLanguage, syncStatus";

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let ts_str: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    let kind_str: String = row.get(6)?;
    let reactions_json: String = row.get(10)?;
    let deleted_for_me_json: String = row.get(11)?;
    let translations_json: String = row.get(13)?;
    let sync_str: String = row.get(15)?;

    let timestamp = parse_ts(&ts_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e)))?;

    let status = MessageStatus::parse(&status_str)
        .ok_or_else(|| text_conversion_err(5, format!("unknown status: {status_str}")))?;

    let kind = MessageKind::parse(&kind_str)
        .ok_or_else(|| text_conversion_err(6, format!("unknown message type: {kind_str}")))?;

    let reactions: ReactionMap = serde_json::from_str(&reactions_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e)))?;

    let deleted_for_me: BTreeSet<String> = serde_json::from_str(&deleted_for_me_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(11, rusqlite::types::Type::Text, Box::new(e)))?;

    let translations = serde_json::from_str(&translations_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(13, rusqlite::types::Type::Text, Box::new(e)))?;

    let sync_status = SyncStatus::parse(&sync_str)
        .ok_or_else(|| text_conversion_err(15, format!("unknown sync status: {sync_str}")))?;

    let deleted_for_everyone: i64 = row.get(12)?;

    Ok(Message {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_id: row.get(2)?,
        text: row.get(3)?,
        timestamp,
        status,
        kind,
        image_url: row.get(7)?,
        thumbnail_url: row.get(8)?,
        caption: row.get(9)?,
        reactions,
        deleted_for_me,
        deleted_for_everyone: deleted_for_everyone != 0,
        deleted_at: None,
        translations,
        detected_language: row.get(14)?,
        sync_status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use confab_shared::{Chat, ChatKind};

    fn seed_chat(db: &Database, id: &str) {
        let chat = Chat {
            id: id.to_string(),
            kind: ChatKind::OneOnOne,
            participants: vec!["u1".into(), "u2".into()],
            created_at: Utc::now(),
            created_by: "u1".into(),
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
        db.upsert_chat(&chat).unwrap();
    }

    #[test]
    fn insert_and_list() {
        let db = Database::open_in_memory().unwrap();
        seed_chat(&db, "c1");

        let m1 = Message::text("m1", "c1", "u1", "first", Utc::now());
        let m2 = Message::text("m2", "c1", "u2", "second", Utc::now());
        db.insert_message(&m1).unwrap();
        db.insert_message(&m2).unwrap();

        let messages = db.list_messages_for_chat("c1", 10, 0).unwrap();
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn json_columns_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        seed_chat(&db, "c1");

        let mut msg = Message::text("m1", "c1", "u1", "hello", Utc::now());
        msg.reactions
            .entry("\u{1F44D}".to_string())
            .or_default()
            .insert("u2".to_string());
        msg.deleted_for_me.insert("u2".to_string());
        db.insert_message(&msg).unwrap();

        let loaded = db.get_message("m1").unwrap();
        assert_eq!(loaded.reactions, msg.reactions);
        assert!(loaded.deleted_for_me.contains("u2"));
        assert!(!loaded.deleted_for_everyone);
    }

    #[test]
    fn status_and_sync_updates() {
        let db = Database::open_in_memory().unwrap();
        seed_chat(&db, "c1");
        db.insert_message(&Message::text("m1", "c1", "u1", "x", Utc::now()))
            .unwrap();

        db.update_message_status("m1", MessageStatus::Sent).unwrap();
        db.set_message_sync_status("m1", SyncStatus::Synced).unwrap();

        let loaded = db.get_message("m1").unwrap();
        assert_eq!(loaded.status, MessageStatus::Sent);
        assert_eq!(loaded.sync_status, SyncStatus::Synced);
    }

    #[test]
    fn tombstone_keeps_row() {
        let db = Database::open_in_memory().unwrap();
        seed_chat(&db, "c1");
        db.insert_message(&Message::text("m1", "c1", "u1", "x", Utc::now()))
            .unwrap();

        db.mark_message_deleted_for_everyone("m1").unwrap();

        let loaded = db.get_message("m1").unwrap();
        assert!(loaded.deleted_for_everyone);
        assert_eq!(loaded.text.as_deref(), Some("x"));
    }
}
