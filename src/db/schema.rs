//! Database schema and migrations

use rusqlite::Connection;

use crate::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
///
/// # Errors
///
/// Returns error if migration fails
pub fn init(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Registered senders; phone_number doubles as the uniqueness
        -- constraint the registration race relies on
        CREATE TABLE IF NOT EXISTS users (
            phone_number TEXT PRIMARY KEY,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- One row per processed image: raw payload plus both heatmaps
        CREATE TABLE IF NOT EXISTS captures (
            id TEXT PRIMARY KEY,
            phone_number TEXT NOT NULL REFERENCES users(phone_number),
            raw_image BLOB NOT NULL,
            heatmap_gen BLOB NOT NULL,
            heatmap_dis BLOB NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_captures_phone ON captures(phone_number);

        PRAGMA user_version = 1;
        ",
    )?;
    Ok(())
}
