use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Error, Result};
use chrono::Utc;
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use uuid::Uuid;

use super::core::{StreamEvent, TurnOutcome, stream_reply};
use super::dedup::remove_duplicates;
use super::models::Transcript;
use super::prompt::{PromptPolicy, SYSTEM_PROMPT, inject_system_prompt};
use super::save::{MessageSink, SaveGate, SaveReceipt};
use crate::openai::{CompletionProvider, Message, Role};

#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub system_message: String,
    pub policy: PromptPolicy,
    pub save_threshold: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            system_message: SYSTEM_PROMPT.to_string(),
            policy: PromptPolicy::default(),
            save_threshold: SaveGate::default().min_messages(),
        }
    }
}

/// Everything that belongs to one interactive session. Created on the
/// first interaction and dropped when the session ends.
#[derive(Debug)]
pub struct ChatSession {
    pub id: String,
    transcript: Transcript,
    system_message: String,
    policy: PromptPolicy,
    gate: SaveGate,
}

impl ChatSession {
    pub fn new(id: &str, settings: &SessionSettings) -> Self {
        Self {
            id: id.to_string(),
            transcript: Transcript::new(),
            system_message: settings.system_message.clone(),
            policy: settings.policy,
            gate: SaveGate::new(settings.save_threshold),
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Start of an interaction cycle. Adds the system prompt according
    /// to the session's policy.
    pub fn begin_cycle(&mut self) -> bool {
        inject_system_prompt(&mut self.transcript, &self.system_message, self.policy)
    }

    /// Run one interaction cycle: inject the system prompt, then if
    /// there is input, stream the reply for it. The user's message
    /// and the reply are only added to the transcript once the reply
    /// is complete so a failed completion leaves the transcript as it
    /// was.
    pub async fn interact(
        &mut self,
        input: Option<&str>,
        provider: &dyn CompletionProvider,
        model: &str,
        tx: Option<&mpsc::UnboundedSender<StreamEvent>>,
        timeout: Duration,
    ) -> TurnOutcome {
        self.begin_cycle();

        let Some(input) = input.filter(|i| !i.trim().is_empty()) else {
            return TurnOutcome::NoInput;
        };

        let user_msg = Message::new(Role::User, input);
        let mut request = self.transcript.messages().to_vec();
        request.push(user_msg.clone());

        match stream_reply(provider, model, &request, tx, timeout).await {
            Ok(reply) => {
                self.transcript.push(user_msg);
                self.transcript.append(Role::Assistant, &reply);
                TurnOutcome::Replied(reply)
            }
            Err(e) => {
                tracing::error!(
                    "Completion failed for session {}: {}. Root cause: {}",
                    self.id,
                    e,
                    e.root_cause()
                );
                TurnOutcome::Failed {
                    input: input.to_string(),
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn save_available(&self) -> bool {
        self.gate.is_open(self.transcript.len())
    }

    /// Deduplicate the transcript and write it to `sink` under a new
    /// save id. Does nothing and returns `None` while saving isn't
    /// available. After a successful write the transcript is replaced
    /// by the deduplicated copy.
    pub async fn save(&mut self, sink: &dyn MessageSink) -> Result<Option<SaveReceipt>, Error> {
        if !self.save_available() {
            tracing::debug!(
                "Save not available for session {} with {} messages",
                self.id,
                self.transcript.len()
            );
            return Ok(None);
        }

        let messages = remove_duplicates(self.transcript.messages());
        let id = Uuid::new_v4().to_string();
        sink.write(&id, &messages).await?;
        self.transcript = Transcript::from(messages.clone());

        tracing::info!("Saved session {} as {}", self.id, id);
        Ok(Some(SaveReceipt {
            id,
            messages,
            saved_at: Utc::now(),
        }))
    }
}

pub type SharedSession = Arc<Mutex<ChatSession>>;

/// Sessions without a turn for this long are ended.
pub const DEFAULT_IDLE_LIMIT: Duration = Duration::from_secs(60 * 60);

struct StoreEntry {
    session: SharedSession,
    last_active: Instant,
}

/// All live sessions keyed by the id the client uses. Each session
/// has its own lock so one turn runs at a time per session. A session
/// that goes longer than the idle limit without a turn is ended as if
/// the client had ended it.
pub struct SessionStore {
    sessions: HashMap<String, StoreEntry>,
    idle_limit: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_idle_limit(DEFAULT_IDLE_LIMIT)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_limit(idle_limit: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            idle_limit,
        }
    }

    /// Get the session for a new turn, starting it if needed. Counts
    /// as activity for the session.
    pub fn get_or_create(&mut self, id: &str, settings: &SessionSettings) -> SharedSession {
        self.evict_idle();

        let now = Instant::now();
        let entry = self.sessions.entry(id.to_string()).or_insert_with(|| {
            tracing::debug!("Starting chat session {}", id);
            StoreEntry {
                session: Arc::new(Mutex::new(ChatSession::new(id, settings))),
                last_active: now,
            }
        });
        entry.last_active = now;
        entry.session.clone()
    }

    pub fn get(&self, id: &str) -> Option<SharedSession> {
        self.sessions
            .get(id)
            .filter(|entry| !self.is_idle(entry))
            .map(|entry| entry.session.clone())
    }

    /// End the session. Returns false if there was no such session.
    pub fn remove(&mut self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// End every session that has been idle for longer than the
    /// limit. Returns how many were ended.
    pub fn evict_idle(&mut self) -> usize {
        let idle_limit = self.idle_limit;
        let before = self.sessions.len();
        self.sessions.retain(|id, entry| {
            let keep = entry.last_active.elapsed() <= idle_limit;
            if !keep {
                tracing::debug!("Ending idle chat session {}", id);
            }
            keep
        });
        before - self.sessions.len()
    }

    fn is_idle(&self, entry: &StoreEntry) -> bool {
        entry.last_active.elapsed() > self.idle_limit
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
