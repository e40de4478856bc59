use std::collections::HashSet;

use crate::openai::{Message, Role};

/// Returns the messages with exact (role, content) duplicates removed,
/// keeping the first occurrence of each and the original order.
pub fn remove_duplicates(messages: &[Message]) -> Vec<Message> {
    let mut seen: HashSet<(Role, &str)> = HashSet::with_capacity(messages.len());
    messages
        .iter()
        .filter(|m| seen.insert((m.role, m.content.as_str())))
        .cloned()
        .collect()
}
