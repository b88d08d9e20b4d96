//! Store-only row types.
//!
//! The domain models themselves live in `confab-shared`; this module holds
//! the rows that exist only in the local cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-chat scroll/read state for restoring the UI between sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScrollPosition {
    pub chat_id: String,
    pub last_read_message_id: Option<String>,
    pub scroll_y_position: f64,
    pub unread_count: i64,
}

/// Retry bookkeeping for a message whose remote commit is outstanding or
/// failed. Lives in the `outbound_queue` table; deleted once the commit
/// lands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEntry {
    pub message_id: String,
    pub chat_id: String,
    pub retry_count: i64,
    pub last_attempt: Option<DateTime<Utc>>,
}
