//! Per-chat scroll/read state.

use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;
use crate::models::ScrollPosition;

impl Database {
    /// Insert or replace the scroll state for a chat.
    pub fn upsert_scroll_position(&self, pos: &ScrollPosition) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO scroll_positions
                (chatId, lastReadMessageId, scrollYPosition, unreadCount)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                pos.chat_id,
                pos.last_read_message_id,
                pos.scroll_y_position,
                pos.unread_count,
            ],
        )?;
        Ok(())
    }

    /// Fetch the scroll state for a chat; `None` when the chat has never
    /// been opened (absence is normal here, not an error).
    pub fn get_scroll_position(&self, chat_id: &str) -> Result<Option<ScrollPosition>> {
        let pos = self
            .conn()
            .query_row(
                "SELECT chatId, lastReadMessageId, scrollYPosition, unreadCount
                 FROM scroll_positions WHERE chatId = ?1",
                params![chat_id],
                |row| {
                    Ok(ScrollPosition {
                        chat_id: row.get(0)?,
                        last_read_message_id: row.get(1)?,
                        scroll_y_position: row.get(2)?,
                        unread_count: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(pos)
    }
}
