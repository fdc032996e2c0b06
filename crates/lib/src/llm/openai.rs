//! OpenAI-compatible chat completions client.
//!
//! **Standard** posts to `{base}/chat/completions` with a bearer key and the model in the body.
//! **Azure** posts to `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version=...`
//! with an `api-key` header; the deployment selects the model.

use crate::llm::{build_messages, status_error, ChatMessage, GenerationError, Generator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Which URL and auth scheme to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenAiFlavor {
    Standard,
    Azure { api_version: String },
}

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    model: String,
    flavor: OpenAiFlavor,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(
        base_url: Option<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        flavor: OpenAiFlavor,
    ) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            api_key: api_key.into(),
            model: model.into(),
            flavor,
            max_tokens: 1024,
            temperature: 0.1,
            client: crate::http_client(super::REQUEST_TIMEOUT),
        }
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    fn completions_url(&self) -> String {
        match &self.flavor {
            OpenAiFlavor::Standard => format!("{}/chat/completions", self.base_url),
            OpenAiFlavor::Azure { api_version } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.base_url, self.model, api_version
            ),
        }
    }

    /// POST chat/completions (non-streaming). Returns the first choice's content.
    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, GenerationError> {
        let body = ChatRequest {
            model: match self.flavor {
                OpenAiFlavor::Standard => Some(self.model.clone()),
                OpenAiFlavor::Azure { .. } => None,
            },
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: false,
        };
        let req = self.client.post(self.completions_url()).json(&body);
        let req = match self.flavor {
            OpenAiFlavor::Standard => req.bearer_auth(&self.api_key),
            OpenAiFlavor::Azure { .. } => req.header("api-key", &self.api_key),
        };
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }
        let data: ChatResponse = res.json().await?;
        first_choice_content(data)
    }
}

#[async_trait]
impl Generator for OpenAiClient {
    async fn generate(
        &self,
        system_prompt: &str,
        question: &str,
        context: &str,
    ) -> Result<String, GenerationError> {
        self.chat(build_messages(system_prompt, question, context)).await
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

fn first_choice_content(data: ChatResponse) -> Result<String, GenerationError> {
    data.choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| GenerationError::Api("response had no content".to_string()))
}
