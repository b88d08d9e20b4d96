//! Outbound mutation queue.
//!
//! Every locally originated message gets a queue entry while its remote
//! commit is outstanding. On commit failure the entry carries the retry
//! count and last-attempt timestamp; retry policy itself belongs to the
//! caller, not the store.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use confab_shared::SyncStatus;

use crate::chats::parse_ts;
use crate::database::Database;
use crate::error::Result;
use crate::models::OutboundEntry;

impl Database {
    /// Register a freshly sent message as pending.
    pub fn enqueue_outbound(&self, message_id: &str, chat_id: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO outbound_queue (messageId, chatId) VALUES (?1, ?2)",
            params![message_id, chat_id],
        )?;
        Ok(())
    }

    /// Record a failed commit attempt: bumps the retry counter, stamps the
    /// attempt time, and flips the message's sync status to `failed`.
    pub fn mark_send_failed(&self, message_id: &str, attempted_at: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "UPDATE outbound_queue
             SET retryCount = retryCount + 1, lastAttempt = ?2
             WHERE messageId = ?1",
            params![message_id, attempted_at.to_rfc3339()],
        )?;
        self.set_message_sync_status(message_id, SyncStatus::Failed)?;
        Ok(())
    }

    /// Record a successful commit: drops the queue entry and marks the
    /// message synced.
    pub fn mark_synced(&self, message_id: &str) -> Result<()> {
        self.conn().execute(
            "DELETE FROM outbound_queue WHERE messageId = ?1",
            params![message_id],
        )?;
        self.set_message_sync_status(message_id, SyncStatus::Synced)?;
        Ok(())
    }

    pub fn get_outbound(&self, message_id: &str) -> Result<Option<OutboundEntry>> {
        let entry = self
            .conn()
            .query_row(
                "SELECT messageId, chatId, retryCount, lastAttempt
                 FROM outbound_queue WHERE messageId = ?1",
                params![message_id],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// All messages whose last commit attempt failed, oldest attempt first.
    pub fn list_failed_outbound(&self) -> Result<Vec<OutboundEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT q.messageId, q.chatId, q.retryCount, q.lastAttempt
             FROM outbound_queue q
             JOIN messages m ON m.id = q.messageId
             WHERE m.syncStatus = 'failed'
             ORDER BY q.lastAttempt ASC",
        )?;

        let rows = stmt.query_map([], row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutboundEntry> {
    let last_attempt_str: Option<String> = row.get(3)?;
    let last_attempt = last_attempt_str.as_deref().map(parse_ts).transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e)))?;

    Ok(OutboundEntry {
        message_id: row.get(0)?,
        chat_id: row.get(1)?,
        retry_count: row.get(2)?,
        last_attempt,
    })
}
