use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::openai::{CompletionProvider, Message};

/// Events published while a turn is in progress. Serialized as the
/// data of each server sent event in the chat API.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Everything received so far for the assistant's reply
    Partial { content: String },
    /// The complete reply, which has been added to the transcript
    Done { content: String },
    /// No reply was generated and the transcript is unchanged
    Error { message: String },
}

/// The result of one interaction cycle. Always defined, even when
/// the provider failed.
#[derive(Clone, Debug, PartialEq)]
pub enum TurnOutcome {
    /// The user's message and the reply were added to the transcript
    Replied(String),
    /// There was no user input this cycle
    NoInput,
    /// The provider failed. The transcript is unchanged and `input`
    /// can be submitted again.
    Failed { input: String, reason: String },
}

/// Streams the next assistant reply for `messages`. After each
/// fragment the running buffer is sent to `tx` (if any) so it can be
/// displayed progressively. Returns the full reply once the provider
/// ends the stream.
///
/// The whole call, including connecting to the provider, must finish
/// within `timeout`.
pub async fn stream_reply(
    provider: &dyn CompletionProvider,
    model: &str,
    messages: &[Message],
    tx: Option<&mpsc::UnboundedSender<StreamEvent>>,
    timeout: Duration,
) -> Result<String, Error> {
    let reply = async {
        let mut stream = provider.stream_completion(model, messages).await?;
        let mut buffer = String::new();
        while let Some(fragment) = stream.next().await {
            buffer.push_str(&fragment?);
            if let Some(tx) = tx {
                // The receiver going away shouldn't stop the reply from
                // being completed and recorded
                let _ = tx.send(StreamEvent::Partial {
                    content: buffer.clone(),
                });
            }
        }
        Ok::<String, Error>(buffer)
    };

    tokio::time::timeout(timeout, reply)
        .await
        .map_err(|_| anyhow!("Completion timed out after {}s", timeout.as_secs()))?
}
