use anyhow::{Error, Result};
use async_trait::async_trait;
use rusqlite::params;
use tokio_rusqlite::Connection;

use super::save::MessageSink;
use crate::core::db::initialize_db;
use crate::openai::{Message, Role};

/// Saves snapshots to the `messages` table.
#[derive(Clone)]
pub struct SqliteSink {
    db: Connection,
}

impl SqliteSink {
    pub fn new(db: Connection) -> Self {
        Self { db }
    }

    /// The messages written by the save `save_id` in the order they
    /// were written. Empty if there is no such save.
    pub async fn find_saved_messages(&self, save_id: &str) -> Result<Vec<Message>, Error> {
        let s_id = save_id.to_owned();
        let rows = self
            .db
            .call(move |conn| {
                initialize_db(conn)?;
                let mut stmt = conn.prepare(
                    "SELECT role, content FROM messages WHERE session_id=? ORDER BY rowid",
                )?;
                let rows = stmt
                    .query_map([s_id], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .filter_map(Result::ok)
                    .collect::<Vec<_>>();
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(role, content)| Ok::<_, Error>(Message::new(role.parse::<Role>()?, &content)))
            .collect()
    }

    /// Every save id, most recent first.
    pub async fn list_saves(&self) -> Result<Vec<String>, Error> {
        let saves = self
            .db
            .call(|conn| {
                initialize_db(conn)?;
                let mut stmt = conn.prepare(
                    r#"
                    SELECT session_id
                    FROM messages
                    GROUP BY session_id
                    ORDER BY MAX(rowid) DESC
                    "#,
                )?;
                let ids = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .filter_map(Result::ok)
                    .collect::<Vec<_>>();
                Ok(ids)
            })
            .await?;
        Ok(saves)
    }
}

#[async_trait]
impl MessageSink for SqliteSink {
    async fn write(&self, save_id: &str, messages: &[Message]) -> Result<usize, Error> {
        let s_id = save_id.to_owned();
        let rows: Vec<(String, String)> = messages
            .iter()
            .map(|m| (m.role.to_string(), m.content.clone()))
            .collect();

        let written = self
            .db
            .call(move |conn| {
                // The snapshot either gets written in full or not at all
                let tx = conn.transaction()?;
                initialize_db(&tx)?;
                let mut written = 0;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO messages (role, content, session_id) VALUES (?, ?, ?)",
                    )?;
                    for (role, content) in rows.iter() {
                        written += stmt.execute(params![role, content, s_id])?;
                    }
                }
                tx.commit()?;
                Ok(written)
            })
            .await?;

        tracing::debug!("Saved {} messages for session {}", written, save_id);
        Ok(written)
    }
}
