//! CRUD operations for [`FriendRequest`] records.

use chrono::{DateTime, Utc};
use rusqlite::params;

use confab_shared::{FriendRequest, FriendRequestStatus};

use crate::chats::{parse_ts, text_conversion_err};
use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    pub fn insert_friend_request(&self, request: &FriendRequest) -> Result<()> {
        self.conn().execute(
            "INSERT INTO friend_requests (id, fromUserId, toUserId, status, createdAt, respondedAt)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                request.id,
                request.from_user_id,
                request.to_user_id,
                request.status.as_str(),
                request.created_at.to_rfc3339(),
                request.responded_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn get_friend_request(&self, id: &str) -> Result<FriendRequest> {
        self.conn()
            .query_row(
                "SELECT id, fromUserId, toUserId, status, createdAt, respondedAt
                 FROM friend_requests WHERE id = ?1",
                params![id],
                row_to_friend_request,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Record the response to a pending request.
    pub fn respond_friend_request(
        &self,
        id: &str,
        status: FriendRequestStatus,
        responded_at: DateTime<Utc>,
    ) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE friend_requests SET status = ?2, respondedAt = ?3 WHERE id = ?1",
            params![id, status.as_str(), responded_at.to_rfc3339()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Incoming requests for a user, newest first.
    pub fn list_friend_requests_for(&self, user_id: &str) -> Result<Vec<FriendRequest>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, fromUserId, toUserId, status, createdAt, respondedAt
             FROM friend_requests
             WHERE toUserId = ?1
             ORDER BY createdAt DESC",
        )?;

        let rows = stmt.query_map(params![user_id], row_to_friend_request)?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?);
        }
        Ok(requests)
    }
}

fn row_to_friend_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<FriendRequest> {
    let status_str: String = row.get(3)?;
    let created_str: String = row.get(4)?;
    let responded_str: Option<String> = row.get(5)?;

    let status = FriendRequestStatus::parse(&status_str)
        .ok_or_else(|| text_conversion_err(3, format!("unknown request status: {status_str}")))?;

    let created_at = parse_ts(&created_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e)))?;

    let responded_at = responded_str.as_deref().map(parse_ts).transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e)))?;

    Ok(FriendRequest {
        id: row.get(0)?,
        from_user_id: row.get(1)?,
        to_user_id: row.get(2)?,
        status,
        created_at,
        responded_at,
    })
}
