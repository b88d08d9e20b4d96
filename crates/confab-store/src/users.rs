//! CRUD operations for cached [`User`] profiles.

use chrono::{DateTime, Utc};
use rusqlite::params;

use confab_shared::User;

use crate::chats::parse_ts;
use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    /// Insert or replace a cached user profile.
    pub fn upsert_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO users (
                id, username, displayName, profilePictureUrl, isOnline, lastSeen, createdAt)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.id,
                user.username,
                user.display_name,
                user.profile_picture_url,
                user.is_online as i64,
                user.last_seen.map(|t| t.to_rfc3339()),
                user.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, username, displayName, profilePictureUrl, isOnline, lastSeen, createdAt
                 FROM users WHERE id = ?1",
                params![id],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, username, displayName, profilePictureUrl, isOnline, lastSeen, createdAt
                 FROM users WHERE username = ?1",
                params![username],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Mirror a presence change into the cached profile.
    pub fn set_user_presence(
        &self,
        id: &str,
        is_online: bool,
        last_seen: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "UPDATE users SET isOnline = ?2, lastSeen = ?3 WHERE id = ?1",
            params![id, is_online as i64, last_seen.to_rfc3339()],
        )?;
        Ok(())
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let is_online: i64 = row.get(4)?;
    let last_seen_str: Option<String> = row.get(5)?;
    let created_str: String = row.get(6)?;

    let last_seen = last_seen_str.as_deref().map(parse_ts).transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e)))?;

    let created_at = parse_ts(&created_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e)))?;

    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        profile_picture_url: row.get(3)?,
        is_online: is_online != 0,
        last_seen,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_and_lookup_by_username() {
        let db = Database::open_in_memory().unwrap();
        let user = User {
            id: "u1".into(),
            username: "ada".into(),
            display_name: Some("Ada".into()),
            profile_picture_url: None,
            is_online: true,
            last_seen: None,
            created_at: Utc::now(),
        };
        db.upsert_user(&user).unwrap();

        let loaded = db.get_user_by_username("ada").unwrap();
        assert_eq!(loaded.id, "u1");
        assert!(loaded.is_online);
    }

    #[test]
    fn presence_mirror() {
        let db = Database::open_in_memory().unwrap();
        let user = User {
            id: "u1".into(),
            username: "ada".into(),
            display_name: None,
            profile_picture_url: None,
            is_online: true,
            last_seen: None,
            created_at: Utc::now(),
        };
        db.upsert_user(&user).unwrap();

        let seen = Utc::now();
        db.set_user_presence("u1", false, seen).unwrap();

        let loaded = db.get_user("u1").unwrap();
        assert!(!loaded.is_online);
        assert!(loaded.last_seen.is_some());
    }
}
