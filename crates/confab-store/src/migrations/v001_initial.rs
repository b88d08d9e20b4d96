//! v001 -- Initial schema creation.
//!
//! Creates the six core tables: `users`, `chats`, `messages`,
//! `scroll_positions`, `friend_requests`, and `metadata`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id                TEXT PRIMARY KEY NOT NULL,
    username          TEXT NOT NULL UNIQUE,
    displayName       TEXT,
    profilePictureUrl TEXT,
    isOnline          INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    lastSeen          TEXT,                        -- ISO-8601 / RFC-3339
    createdAt         TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Chats
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chats (
    id                  TEXT PRIMARY KEY NOT NULL,
    type                TEXT NOT NULL,             -- 'one-on-one' | 'group'
    participants        TEXT NOT NULL,             -- JSON array of user ids
    lastMessageText     TEXT,
    lastMessageTime     TEXT,
    lastMessageSenderId TEXT,
    lastMessageStatus   TEXT,
    unreadCount         INTEGER NOT NULL DEFAULT 0,
    groupName           TEXT,
    groupIcon           TEXT,
    groupDescription    TEXT,
    groupAdminId        TEXT,
    inviteCode          TEXT,
    createdAt           TEXT NOT NULL,
    createdBy           TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id                 TEXT PRIMARY KEY NOT NULL,
    chatId             TEXT NOT NULL,              -- FK -> chats(id)
    senderId           TEXT NOT NULL,
    text               TEXT,
    timestamp          TEXT NOT NULL,              -- ISO-8601
    status             TEXT NOT NULL,              -- message status machine
    type               TEXT NOT NULL,              -- 'text' | 'image'
    imageUrl           TEXT,
    thumbnailUrl       TEXT,
    caption            TEXT,
    reactions          TEXT NOT NULL DEFAULT '{}', -- JSON: emoji -> [user ids]
    deletedForMe       TEXT NOT NULL DEFAULT '[]', -- JSON array of user ids
    deletedForEveryone INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    translations       TEXT NOT NULL DEFAULT '{}', -- JSON: lang -> translation
    detectedLanguage   TEXT,
    syncStatus         TEXT NOT NULL DEFAULT 'synced',

    FOREIGN KEY (chatId) REFERENCES chats(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chatId);
CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);

-- ----------------------------------------------------------------
-- Scroll positions (per-chat read state)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS scroll_positions (
    chatId            TEXT PRIMARY KEY NOT NULL,  -- FK -> chats(id)
    lastReadMessageId TEXT,
    scrollYPosition   REAL NOT NULL DEFAULT 0,
    unreadCount       INTEGER NOT NULL DEFAULT 0,

    FOREIGN KEY (chatId) REFERENCES chats(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Friend requests
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS friend_requests (
    id          TEXT PRIMARY KEY NOT NULL,
    fromUserId  TEXT NOT NULL,
    toUserId    TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'pending',
    createdAt   TEXT NOT NULL,
    respondedAt TEXT
);

CREATE INDEX IF NOT EXISTS idx_friend_requests_to ON friend_requests(toUserId);

-- ----------------------------------------------------------------
-- Metadata (schema version and other key/value state)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS metadata (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
