//! v002 -- Outbound mutation queue.
//!
//! Tracks messages whose authoritative commit is outstanding or failed,
//! with retry bookkeeping the `messages` table does not carry.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS outbound_queue (
    messageId   TEXT PRIMARY KEY NOT NULL,      -- FK -> messages(id)
    chatId      TEXT NOT NULL,
    retryCount  INTEGER NOT NULL DEFAULT 0,
    lastAttempt TEXT,                           -- ISO-8601, null before first failure

    FOREIGN KEY (messageId) REFERENCES messages(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_outbound_chat ON outbound_queue(chatId);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
