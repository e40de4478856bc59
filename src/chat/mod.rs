//! Conversation state for a single chat session: the message log,
//! system prompt injection, streaming replies and saving snapshots.

mod core;
pub mod db;
pub mod dedup;
pub mod models;
pub mod prompt;
pub mod render;
pub mod save;
pub mod session;

pub use self::core::{StreamEvent, TurnOutcome, stream_reply};
pub use db::SqliteSink;
pub use dedup::remove_duplicates;
pub use models::Transcript;
pub use prompt::{PromptPolicy, SYSTEM_PROMPT, inject_system_prompt};
pub use save::{DisplaySink, MessageSink, SaveGate, SaveReceipt};
pub use session::{ChatSession, SessionSettings, SessionStore};
