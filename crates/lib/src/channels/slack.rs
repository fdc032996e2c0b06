//! Slack Web API client: conversations.history, chat.postMessage, conversations.open,
//! and slash-command response_url posts.

use crate::channels::messaging::{HistoryRecord, Messaging, MessagingError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

pub const SLACK_API_BASE: &str = "https://slack.com/api";

/// Per-call limit for Web API and response_url requests.
const SLACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Host Slack issues slash-command response_urls on.
const CALLBACK_HOST: &str = "hooks.slack.com";

/// True for `https://hooks.slack.com/...`. Anything else is not a Slack callback and must not
/// receive channel content.
pub fn is_slack_callback_url(url: &str) -> bool {
    match reqwest::Url::parse(url) {
        Ok(u) => u.scheme() == "https" && u.host_str() == Some(CALLBACK_HOST),
        Err(_) => false,
    }
}

/// Envelope every Web API method returns: `ok` plus an `error` code when false.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    body: T,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryBody {
    #[serde(default)]
    messages: Vec<SlackMessage>,
}

#[derive(Debug, Deserialize)]
struct SlackMessage {
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    ts: String,
}

#[derive(Debug, Default, Deserialize)]
struct OpenBody {
    #[serde(default)]
    channel: Option<OpenedChannel>,
}

#[derive(Debug, Deserialize)]
struct OpenedChannel {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct Empty {}

/// Slack bot client. Cheap to clone.
#[derive(Clone)]
pub struct SlackClient {
    api_base: String,
    token: String,
    client: reqwest::Client,
}

impl SlackClient {
    pub fn new(token: impl Into<String>, api_base: Option<String>) -> Self {
        let api_base = api_base
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| SLACK_API_BASE.to_string());
        Self {
            api_base,
            token: token.into(),
            client: crate::http_client(SLACK_TIMEOUT),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base, method)
    }

    /// Read a Web API response: non-2xx is an Http error, `ok: false` is an Api error.
    async fn read_envelope<T>(res: reqwest::Response) -> Result<T, MessagingError>
    where
        T: for<'de> Deserialize<'de> + Default,
    {
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(MessagingError::Http { status, body });
        }
        let data: ApiEnvelope<T> = res.json().await?;
        if !data.ok {
            return Err(MessagingError::Api(
                data.error.unwrap_or_else(|| "unknown_error".to_string()),
            ));
        }
        Ok(data.body)
    }

    async fn post_method<T>(&self, method: &str, body: &Value) -> Result<T, MessagingError>
    where
        T: for<'de> Deserialize<'de> + Default,
    {
        let res = self
            .client
            .post(self.method_url(method))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        Self::read_envelope(res).await
    }
}

#[async_trait]
impl Messaging for SlackClient {
    async fn fetch_history(
        &self,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, MessagingError> {
        let limit = limit.to_string();
        let res = self
            .client
            .get(self.method_url("conversations.history"))
            .bearer_auth(&self.token)
            .query(&[("channel", channel), ("limit", limit.as_str())])
            .send()
            .await?;
        let body: HistoryBody = Self::read_envelope(res).await?;
        Ok(body
            .messages
            .into_iter()
            .filter_map(|m| {
                let text = m.text.filter(|t| !t.trim().is_empty())?;
                let author = m
                    .user
                    .or(m.username)
                    .or(m.bot_id)
                    .unwrap_or_else(|| "unknown".to_string());
                Some(HistoryRecord {
                    author,
                    text,
                    ts: m.ts,
                })
            })
            .collect())
    }

    async fn send(
        &self,
        channel: &str,
        text: &str,
        blocks: Option<&Value>,
        thread_ts: Option<&str>,
    ) -> Result<(), MessagingError> {
        let mut body = json!({ "channel": channel, "text": text });
        if let Some(b) = blocks {
            body["blocks"] = b.clone();
        }
        if let Some(ts) = thread_ts {
            body["thread_ts"] = Value::String(ts.to_string());
        }
        let _: Empty = self.post_method("chat.postMessage", &body).await?;
        Ok(())
    }

    async fn open_direct_conversation(&self, user: &str) -> Result<String, MessagingError> {
        let body: OpenBody = self
            .post_method("conversations.open", &json!({ "users": user }))
            .await?;
        body.channel
            .map(|c| c.id)
            .ok_or_else(|| MessagingError::Api("missing_channel".to_string()))
    }

    async fn post_to_callback(
        &self,
        url: &str,
        text: &str,
        blocks: Option<&Value>,
    ) -> Result<(), MessagingError> {
        if !is_slack_callback_url(url) {
            return Err(MessagingError::Api("untrusted_response_url".to_string()));
        }
        let mut body = json!({
            "response_type": "ephemeral",
            "replace_original": false,
            "text": text,
        });
        if let Some(b) = blocks {
            body["blocks"] = b.clone();
        }
        // response_url is pre-authorised; it answers with plain "ok", not a JSON envelope.
        let res = self.client.post(url).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(MessagingError::Http { status, body });
        }
        Ok(())
    }
}
