//! Messaging collaborator: the narrow surface the worker needs from the chat platform.

use async_trait::async_trait;
use serde_json::Value;

/// One message from a channel's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub author: String,
    pub text: String,
    pub ts: String,
}

/// Whether a failed call is worth retrying later. Only used for log level; nothing retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Permanent,
}

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("slack request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("slack http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("slack api error: {0}")]
    Api(String),
}

impl MessagingError {
    pub fn kind(&self) -> FailureKind {
        match self {
            MessagingError::Request(e) if e.is_decode() => FailureKind::Permanent,
            MessagingError::Request(_) => FailureKind::Transient,
            MessagingError::Http { status, .. } if *status == 429 || *status >= 500 => {
                FailureKind::Transient
            }
            MessagingError::Http { .. } => FailureKind::Permanent,
            MessagingError::Api(code) => match code.as_str() {
                "ratelimited" | "service_unavailable" | "fatal_error" | "request_timeout" => {
                    FailureKind::Transient
                }
                _ => FailureKind::Permanent,
            },
        }
    }

    /// Short description safe to show to a Slack user.
    pub fn user_message(&self) -> String {
        match self.kind() {
            FailureKind::Transient => "Slack is not responding right now".to_string(),
            FailureKind::Permanent => match self {
                MessagingError::Api(code) => format!("Slack refused the request ({})", code),
                _ => "Slack refused the request".to_string(),
            },
        }
    }
}

/// Outbound and history calls against the chat platform.
#[async_trait]
pub trait Messaging: Send + Sync {
    /// Recent messages in `channel`, at most `limit`. Order is whatever the platform returns.
    async fn fetch_history(
        &self,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, MessagingError>;

    /// Post to a channel, optionally as a reply in `thread_ts`.
    async fn send(
        &self,
        channel: &str,
        text: &str,
        blocks: Option<&Value>,
        thread_ts: Option<&str>,
    ) -> Result<(), MessagingError>;

    /// Open (or reuse) a direct conversation with `user`; returns its channel id.
    async fn open_direct_conversation(&self, user: &str) -> Result<String, MessagingError>;

    /// Post to a slash-command `response_url`.
    async fn post_to_callback(
        &self,
        url: &str,
        text: &str,
        blocks: Option<&Value>,
    ) -> Result<(), MessagingError>;
}
