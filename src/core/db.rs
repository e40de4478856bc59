//! Database connection helpers and schema.

use std::fs;
use std::path::Path;

use anyhow::{Error, Result};
use rusqlite::Connection as SyncConnection;
use tokio_rusqlite::Connection;

const DB_FILE_NAME: &str = "ideabot.sqlite";

// Saved snapshots. `role` and `content` are the persisted record,
// `session_id` is the save id minted when the snapshot was taken.
const CREATE_MESSAGES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS messages (
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    session_id TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS messages_session_id ON messages (session_id);
";

/// Open the async connection to the database stored in the
/// directory `db_path`. The directory is created if it doesn't exist.
pub async fn async_db(db_path: &str) -> Result<Connection, Error> {
    fs::create_dir_all(db_path)?;
    let file = Path::new(db_path).join(DB_FILE_NAME);
    let db = Connection::open(file).await?;
    Ok(db)
}

/// Create every table used by the app. Safe to run repeatedly.
pub fn initialize_db(conn: &SyncConnection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(CREATE_MESSAGES_TABLE)
}

/// Bring an existing database up to date with the current schema.
pub fn migrate_db(conn: &SyncConnection) -> Result<(), rusqlite::Error> {
    // There is only one schema version so far
    initialize_db(conn)
}
