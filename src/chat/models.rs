//! The message log for a stateful chat with an LLM.
use crate::openai::{Message, Role};

/// Ordered log of every message in a session. Messages are only ever
/// appended; the whole log can be swapped for a deduplicated copy.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Transcript(Vec<Message>);

impl Transcript {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn new_with_messages(messages: Vec<Message>) -> Self {
        Self(messages)
    }

    pub fn append(&mut self, role: Role, content: &str) {
        self.push(Message::new(role, content))
    }

    pub fn push(&mut self, msg: Message) {
        self.0.push(msg)
    }

    /// Every message including system messages, in insertion order.
    /// This is what gets sent to the completion provider.
    pub fn messages(&self) -> &[Message] {
        &self.0
    }

    /// Messages that are shown to the user. System messages are never
    /// rendered.
    pub fn rendered(&self) -> Vec<Message> {
        self.iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.0.iter()
    }
}

impl From<Vec<Message>> for Transcript {
    fn from(messages: Vec<Message>) -> Self {
        Self::new_with_messages(messages)
    }
}
