//! Saving a snapshot of a session's transcript.

use std::io::{self, Write};
use std::sync::Mutex;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;

use crate::openai::{Message, Role};

/// Decides when saving becomes available. A transcript can only be
/// saved once it has more than `min_messages` messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SaveGate {
    min_messages: usize,
}

impl SaveGate {
    pub fn new(min_messages: usize) -> Self {
        Self { min_messages }
    }

    pub fn min_messages(&self) -> usize {
        self.min_messages
    }

    pub fn is_open(&self, transcript_len: usize) -> bool {
        transcript_len > self.min_messages
    }
}

impl Default for SaveGate {
    fn default() -> Self {
        Self::new(2)
    }
}

/// What was written by a successful save.
#[derive(Clone, Debug, Serialize)]
pub struct SaveReceipt {
    /// Freshly generated for every save
    pub id: String,
    pub messages: Vec<Message>,
    pub saved_at: DateTime<Utc>,
}

/// Destination for saved snapshots.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Write every message tagged with `save_id`. Either all of the
    /// messages are written or none are. Returns the number written.
    async fn write(&self, save_id: &str, messages: &[Message]) -> Result<usize, Error>;
}

/// Render a snapshot as markdown. System messages are left out.
pub fn render_snapshot(save_id: &str, messages: &[Message]) -> String {
    let body = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| format!("**{}:** {}", m.role, m.content.trim()))
        .join("\n\n");
    format!("Session {}\n\n{}\n", save_id, body)
}

/// Prints the snapshot instead of storing it.
pub struct DisplaySink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> DisplaySink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DisplaySink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

#[async_trait]
impl<W: Write + Send> MessageSink for DisplaySink<W> {
    async fn write(&self, save_id: &str, messages: &[Message]) -> Result<usize, Error> {
        // Render everything first so a failed write never prints half
        // a transcript
        let text = render_snapshot(save_id, messages);
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow!("Display sink lock poisoned"))?;
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(messages.len())
    }
}
