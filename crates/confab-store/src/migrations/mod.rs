//! Database migration runner.
//!
//! Migrations are executed in order on every [`Database::new`] /
//! [`Database::open_at`] call. The applied schema version is stored under
//! the `schema_version` key of the `metadata` table, so each migration runs
//! exactly once per database file.

pub mod v001_initial;
pub mod v002_outbound_queue;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};

/// Current schema version. Bump this and add a new migration module
/// whenever the schema changes.
const CURRENT_VERSION: u32 = 2;

const VERSION_KEY: &str = "schema_version";

/// Run all pending migrations against the open connection.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current = schema_version(conn)?;

    tracing::info!(
        current_version = current,
        target_version = CURRENT_VERSION,
        "checking database migrations"
    );

    if current < 1 {
        tracing::info!("applying migration v001_initial");
        v001_initial::up(conn).map_err(|e| StoreError::Migration(e.to_string()))?;
        set_schema_version(conn, 1)?;
    }

    if current < 2 {
        tracing::info!("applying migration v002_outbound_queue");
        v002_outbound_queue::up(conn).map_err(|e| StoreError::Migration(e.to_string()))?;
        set_schema_version(conn, 2)?;
    }

    Ok(())
}

/// Read the applied schema version; 0 for a fresh database where the
/// `metadata` table does not exist yet.
fn schema_version(conn: &Connection) -> Result<u32> {
    let has_metadata: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'metadata'",
        [],
        |row| row.get(0),
    )?;
    if has_metadata == 0 {
        return Ok(0);
    }

    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            params![VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match value {
        None => Ok(0),
        Some(v) => v
            .parse()
            .map_err(|_| StoreError::Migration(format!("invalid schema version: {v}"))),
    }
}

fn set_schema_version(conn: &Connection, version: u32) -> Result<()> {
    conn.execute(
        "INSERT INTO metadata (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![VERSION_KEY, version.to_string()],
    )?;
    Ok(())
}
