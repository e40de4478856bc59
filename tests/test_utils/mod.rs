//! Test utilities for integration tests
#![allow(dead_code)]

use std::sync::{Arc, Mutex, RwLock};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use axum::{Router, body::Body};
use futures::stream;
use tokio_rusqlite::Connection;

use ideabot::api::AppState;
use ideabot::api::app;
use ideabot::chat::PromptPolicy;
use ideabot::core::db::initialize_db;
use ideabot::core::{AppConfig, SinkKind};
use ideabot::openai::{CompletionProvider, FragmentStream, Message};

pub const TEST_SYSTEM_MESSAGE: &str = "You are a helpful assistant.";

/// Streams the same fragments for every turn and records every
/// request it receives.
pub struct ScriptedProvider {
    fragments: Vec<String>,
    pub requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn stream_completion(
        &self,
        _model: &str,
        messages: &[Message],
    ) -> Result<FragmentStream, Error> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let items: Vec<Result<String, Error>> =
            self.fragments.iter().map(|f| Ok(f.clone())).collect();
        Ok(Box::pin(stream::iter(items)))
    }
}

/// Fails every request like an unreachable API would
pub struct FailingProvider;

#[async_trait]
impl CompletionProvider for FailingProvider {
    async fn stream_completion(
        &self,
        _model: &str,
        _messages: &[Message],
    ) -> Result<FragmentStream, Error> {
        Err(anyhow!("connection refused"))
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        storage_path: String::from("./"),
        db_path: String::from("./db"),
        openai_model: String::from("gpt-4"),
        openai_api_hostname: String::from("http://localhost:1"),
        openai_api_key: String::from("test-api-key"),
        system_message: String::from(TEST_SYSTEM_MESSAGE),
        prompt_policy: PromptPolicy::OncePerSession,
        save_threshold: 2,
        sink: SinkKind::Sqlite,
        completion_timeout_secs: 5,
        session_idle_secs: 3600,
    }
}

/// Creates a test application router backed by an in-memory db and
/// the given completion provider.
pub async fn test_app_with(config: AppConfig, provider: Arc<dyn CompletionProvider>) -> Router {
    let db = Connection::open_in_memory()
        .await
        .expect("Failed to open in-memory db");
    db.call(|conn| {
        initialize_db(conn).expect("Failed to migrate db");
        Ok(())
    })
    .await
    .unwrap();

    let app_state =
        AppState::with_provider(db, config, provider).expect("Failed to build app state");
    app(Arc::new(RwLock::new(app_state)))
}

/// Creates a test application router whose provider always replies
/// "Hi there" in two fragments.
pub async fn test_app() -> Router {
    test_app_with(
        test_config(),
        Arc::new(ScriptedProvider::new(&["Hi", " there"])),
    )
    .await
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Failed to read body");
    String::from_utf8(bytes.to_vec()).expect("Body is not utf8")
}
