//! Public types for the chat API
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::SaveReceipt;
use crate::openai::Message;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ChatTranscriptResponse {
    pub session_id: String,
    // Never includes the system prompt
    pub transcript: Vec<Message>,
    pub save_available: bool,
}

#[derive(Serialize)]
pub struct SaveResponse {
    pub id: String,
    pub message_count: usize,
    pub messages: Vec<Message>,
    pub saved_at: DateTime<Utc>,
    /// The printed snapshot when saving to the display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl SaveResponse {
    pub fn new(receipt: SaveReceipt, display: Option<String>) -> Self {
        Self {
            id: receipt.id,
            message_count: receipt.messages.len(),
            messages: receipt.messages,
            saved_at: receipt.saved_at,
            display,
        }
    }
}
