//! Public types for the saves API
use serde::Serialize;

use crate::openai::Message;

#[derive(Serialize)]
pub struct SavesResponse {
    pub saves: Vec<String>,
}

#[derive(Serialize)]
pub struct SavedSessionResponse {
    pub id: String,
    pub messages: Vec<Message>,
}
