//! Generation collaborator: turns a question plus channel context into answer text.
//!
//! Backends: OpenAI-compatible chat completions (api.openai.com or an Azure deployment) and a
//! local Ollama instance. The worker only sees the [`Generator`] trait.

mod ollama;
mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use ollama::OllamaClient;
pub use openai::{OpenAiClient, OpenAiFlavor};

/// Client-side limit on one backend request. The worker applies its own, usually shorter,
/// bound on top.
pub(crate) const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);

/// One chat message sent to a backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation rate limited: {0}")]
    RateLimited(String),
    #[error("generation backend unreachable: {0}")]
    Connection(String),
    #[error("generation api error: {0}")]
    Api(String),
}

impl GenerationError {
    /// Short description safe to show to a Slack user.
    pub fn user_message(&self) -> &'static str {
        match self {
            GenerationError::RateLimited(_) => {
                "the language model is rate limited right now, please try again in a minute"
            }
            GenerationError::Connection(_) => "the language model could not be reached",
            GenerationError::Api(_) => "the language model returned an error",
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            GenerationError::Connection(e.to_string())
        } else {
            GenerationError::Api(e.to_string())
        }
    }
}

/// Map a non-2xx backend response to an error kind.
pub(crate) fn status_error(status: reqwest::StatusCode, body: String) -> GenerationError {
    let detail = format!("{} {}", status, body);
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        GenerationError::RateLimited(detail)
    } else if status == reqwest::StatusCode::SERVICE_UNAVAILABLE
        || status == reqwest::StatusCode::BAD_GATEWAY
        || status == reqwest::StatusCode::GATEWAY_TIMEOUT
    {
        GenerationError::Connection(detail)
    } else {
        GenerationError::Api(detail)
    }
}

/// Single blocking generation call. Retries, if any, belong to the implementation.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        question: &str,
        context: &str,
    ) -> Result<String, GenerationError>;
}

/// Messages for one generation call: system prompt, then the question with the channel
/// context attached.
pub fn build_messages(system_prompt: &str, question: &str, context: &str) -> Vec<ChatMessage> {
    let user = if context.trim().is_empty() {
        question.to_string()
    } else {
        format!(
            "Conversation messages:\n{}\n\nQuestion: {}",
            context.trim(),
            question
        )
    };
    vec![ChatMessage::system(system_prompt), ChatMessage::user(user)]
}
