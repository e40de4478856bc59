use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Error, Result, anyhow};

use crate::chat::prompt::{PromptPolicy, SYSTEM_PROMPT};
use crate::chat::session::{DEFAULT_IDLE_LIMIT, SessionSettings};

/// Where a save writes its snapshot to.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkKind {
    /// Print the snapshot back to the page or terminal
    Display,
    /// Write the snapshot to the `messages` table
    Sqlite,
}

impl FromStr for SinkKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "display" => Ok(Self::Display),
            "sqlite" | "db" => Ok(Self::Sqlite),
            other => Err(anyhow!("Unknown sink {other}, expected display or sqlite")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub storage_path: String,
    pub db_path: String,
    pub openai_model: String,
    pub openai_api_hostname: String,
    pub openai_api_key: String,
    pub system_message: String,
    pub prompt_policy: PromptPolicy,
    pub save_threshold: usize,
    pub sink: SinkKind,
    pub completion_timeout_secs: u64,
    pub session_idle_secs: u64,
}

impl AppConfig {
    /// Build the config from the process environment. A missing
    /// `OPENAI_API_KEY` is fatal.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build the config from any key lookup, used by `from_env` and
    /// by tests that shouldn't touch the real environment.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (storage_path, db_path) = Self::storage_paths(&lookup);
        let openai_api_key = lookup("OPENAI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or(anyhow!("Missing env var OPENAI_API_KEY"))?;
        let openai_api_hostname = lookup("IDEABOT_LLM_HOST")
            .unwrap_or_else(|| "https://api.openai.com".to_string());
        let openai_model = lookup("IDEABOT_LLM_MODEL").unwrap_or_else(|| "gpt-4".to_string());
        let system_message =
            lookup("IDEABOT_SYSTEM_MESSAGE").unwrap_or_else(|| SYSTEM_PROMPT.to_string());
        let prompt_policy = match lookup("IDEABOT_PROMPT_POLICY") {
            Some(val) => val.parse()?,
            None => PromptPolicy::default(),
        };
        let save_threshold = match lookup("IDEABOT_SAVE_THRESHOLD") {
            Some(val) => val
                .trim()
                .parse()
                .with_context(|| format!("Invalid IDEABOT_SAVE_THRESHOLD {val}"))?,
            None => 2,
        };
        let sink = match lookup("IDEABOT_SINK") {
            Some(val) => val.parse()?,
            None => SinkKind::Sqlite,
        };
        let completion_timeout_secs = match lookup("IDEABOT_COMPLETION_TIMEOUT_SECS") {
            Some(val) => val
                .trim()
                .parse()
                .with_context(|| format!("Invalid IDEABOT_COMPLETION_TIMEOUT_SECS {val}"))?,
            None => 60 * 5,
        };
        let session_idle_secs = match lookup("IDEABOT_SESSION_IDLE_SECS") {
            Some(val) => val
                .trim()
                .parse()
                .with_context(|| format!("Invalid IDEABOT_SESSION_IDLE_SECS {val}"))?,
            None => DEFAULT_IDLE_LIMIT.as_secs(),
        };

        Ok(Self {
            storage_path,
            db_path,
            openai_model,
            openai_api_hostname,
            openai_api_key,
            system_message,
            prompt_policy,
            save_threshold,
            sink,
            completion_timeout_secs,
            session_idle_secs,
        })
    }

    /// The storage directory and the db directory inside it. Needs no
    /// credentials so commands that only touch the db can use it.
    pub fn storage_paths<F>(lookup: &F) -> (String, String)
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage_path = lookup("IDEABOT_STORAGE_PATH").unwrap_or("./".to_string());
        let db_path = format!("{}/db", storage_path.trim_end_matches('/'));
        (storage_path, db_path)
    }

    /// Path to the db directory from the process environment.
    pub fn db_path_from_env() -> String {
        Self::storage_paths(&|key: &str| env::var(key).ok()).1
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }

    pub fn session_idle_limit(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            system_message: self.system_message.clone(),
            policy: self.prompt_policy,
            save_threshold: self.save_threshold,
        }
    }
}
