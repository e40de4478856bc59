use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Error, Result, anyhow, bail};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::Stream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "user")]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Assistant => "assistant",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "assistant" => Ok(Role::Assistant),
            "user" => Ok(Role::User),
            other => Err(anyhow!("Unknown role: {}", other)),
        }
    }
}

/// One role-tagged record in a conversation. Two messages are the
/// same message when both role and content match exactly.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Message {
            role,
            content: content.to_string(),
        }
    }
}

/// Text fragments of a single assistant turn in the order they were
/// produced. Finite and can only be consumed once.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, Error>> + Send>>;

/// Anything that can turn a transcript into a streamed completion.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn stream_completion(
        &self,
        model: &str,
        messages: &[Message],
    ) -> Result<FragmentStream, Error>;
}

/// Completion provider for OpenAI compatible APIs.
#[derive(Clone, Debug)]
pub struct OpenAiProvider {
    api_hostname: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiProvider {
    pub fn new(api_hostname: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            api_hostname: api_hostname.to_string(),
            api_key: api_key.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn stream_completion(
        &self,
        model: &str,
        messages: &[Message],
    ) -> Result<FragmentStream, Error> {
        let payload = json!({
            "model": model,
            "messages": messages,
            "stream": true,
        });
        let url = format!(
            "{}/v1/chat/completions",
            self.api_hostname.trim_end_matches("/")
        );
        let response = reqwest::Client::new()
            .post(url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Completion request failed with status {}: {}", status, body);
        }

        Ok(Box::pin(sse_fragments(response.bytes_stream())))
    }
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunkChoice {
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<CompletionChunkChoice>,
}

/// Parse a server sent events body from the chat completions API into
/// the content fragments it carries.
fn sse_fragments<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, Error>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<Error> + Send,
{
    try_stream! {
        let mut bytes = Box::pin(bytes);
        // Events can be split across network frames (and so can
        // multi-byte characters) so only complete events are decoded.
        let mut buffer: Vec<u8> = Vec::new();
        let mut finished = false;

        while !finished {
            let Some(chunk) = bytes.next().await else {
                break;
            };
            let chunk = chunk.map_err(|e| -> Error { e.into() })?;
            buffer.extend_from_slice(chunk.as_ref());

            while let Some(event_end) = buffer.windows(2).position(|w| w == b"\n\n") {
                let event = String::from_utf8(buffer.drain(..event_end + 2).collect())?;
                let Some(data) = event.trim().strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();

                // Data can sometimes be empty
                if data.is_empty() {
                    continue;
                }
                if data == "[DONE]" {
                    finished = true;
                    break;
                }

                let chunk = serde_json::from_str::<CompletionChunk>(data).inspect_err(|e| {
                    tracing::error!("Parsing completion chunk failed for {}\nError:{}", data, e)
                })?;
                let Some(choice) = chunk.choices.into_iter().next() else {
                    continue;
                };
                if let Some(content) = choice.delta.content {
                    if !content.is_empty() {
                        yield content;
                    }
                }
                if choice.finish_reason.is_some() {
                    finished = true;
                    break;
                }
            }
        }

        // A body that stops without a terminator is an interrupted
        // reply, not a complete one. The final event is allowed to
        // miss its trailing blank line.
        if !finished {
            let rest = String::from_utf8_lossy(&buffer);
            if rest.trim().strip_prefix("data:").map(str::trim) != Some("[DONE]") {
                tracing::error!(
                    "Completion stream ended early with {} unparsed bytes",
                    buffer.len()
                );
                Err::<(), Error>(anyhow!("Completion stream ended before [DONE]"))?;
            }
        }
    }
}
