use std::sync::Arc;

use anyhow::{Error, Result};
use handlebars::Handlebars;
use tokio_rusqlite::Connection;

use crate::chat::render::templates;
use crate::chat::{ChatSession, DisplaySink, SaveReceipt, SessionStore, SqliteSink};
use crate::core::{AppConfig, SinkKind};
use crate::openai::{CompletionProvider, OpenAiProvider};

pub struct AppState {
    // Live chat sessions by session id
    pub sessions: SessionStore,
    pub provider: Arc<dyn CompletionProvider>,
    pub db: Connection,
    pub config: AppConfig,
    pub templates: Arc<Handlebars<'static>>,
}

impl AppState {
    pub fn new(db: Connection, config: AppConfig) -> Result<Self> {
        let provider = OpenAiProvider::new(
            &config.openai_api_hostname,
            &config.openai_api_key,
            config.completion_timeout(),
        );
        Self::with_provider(db, config, Arc::new(provider))
    }

    /// Use a specific completion provider instead of the one
    /// configured by `AppConfig`.
    pub fn with_provider(
        db: Connection,
        config: AppConfig,
        provider: Arc<dyn CompletionProvider>,
    ) -> Result<Self> {
        Ok(Self {
            sessions: SessionStore::with_idle_limit(config.session_idle_limit()),
            provider,
            db,
            config,
            templates: Arc::new(templates()?),
        })
    }
}

/// A save made through the HTTP interfaces
pub struct SavedSnapshot {
    pub receipt: SaveReceipt,
    /// The printed snapshot when saving to the display
    pub display: Option<String>,
}

/// Save the session to the configured sink. Returns `None` while
/// saving isn't available for the session yet.
pub async fn save_to_sink(
    session: &mut ChatSession,
    sink_kind: SinkKind,
    db: Connection,
) -> Result<Option<SavedSnapshot>, Error> {
    let saved = match sink_kind {
        SinkKind::Display => {
            let sink = DisplaySink::new(Vec::new());
            let receipt = session.save(&sink).await?;
            let display = String::from_utf8_lossy(&sink.into_inner()).to_string();
            receipt.map(|receipt| SavedSnapshot {
                receipt,
                display: Some(display),
            })
        }
        SinkKind::Sqlite => {
            let sink = SqliteSink::new(db);
            session
                .save(&sink)
                .await?
                .map(|receipt| SavedSnapshot {
                    receipt,
                    display: None,
                })
        }
    };
    Ok(saved)
}
