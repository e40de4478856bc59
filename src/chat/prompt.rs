//! The system prompt and when it gets added to the transcript.

use std::str::FromStr;

use anyhow::{Error, Result, anyhow};

use super::models::Transcript;
use crate::openai::Role;

pub const SYSTEM_PROMPT: &str = r"
I invite you to serve as both a sounding board and collaborator in exploring the potential of AI and AI tools for social advancement. Your role is to help articulate and advocate for ideas centered around leveraging AI for societal good. When I share ideas, especially those that may be brief or unclear, I'd appreciate it if you could rephrase them into more coherent and readable statements. Your advocacy should extend by elaborating on these ideas and presenting compelling arguments for their potential in driving meaningful social impact.

As an AI designed to engage in dialogue, your primary objective is to stimulate insightful discussions on utilizing AI for social upliftment and betterment. Upon receiving an idea from me, acknowledge the submission with brief commendation, restate the idea with enhanced clarity, coherence, and readability, and then pose a follow-up question to delve deeper into the idea, helping to flesh out its potential further.
";

/// When the system prompt is added to a session's transcript.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PromptPolicy {
    /// Only when the transcript is empty. There is never more than
    /// one system message.
    #[default]
    OncePerSession,
    /// At the start of every interaction cycle, even if the
    /// transcript already has one. Produces repeated system messages.
    EveryCycle,
}

impl FromStr for PromptPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "once" | "once_per_session" => Ok(Self::OncePerSession),
            "every_cycle" | "every" => Ok(Self::EveryCycle),
            other => Err(anyhow!(
                "Unknown prompt policy {other}, expected once or every_cycle"
            )),
        }
    }
}

/// Add the system prompt to the transcript according to `policy`.
/// Returns true if a message was appended.
pub fn inject_system_prompt(
    transcript: &mut Transcript,
    system_message: &str,
    policy: PromptPolicy,
) -> bool {
    match policy {
        PromptPolicy::OncePerSession if !transcript.is_empty() => false,
        _ => {
            transcript.append(Role::System, system_message);
            true
        }
    }
}
