//! Ollama API client (http://127.0.0.1:11434 by default), non-streaming chat only.

use crate::llm::{build_messages, status_error, ChatMessage, GenerationError, Generator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";

/// Client for Ollama HTTP API.
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>, model: impl Into<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            model: model.into(),
            temperature: 0.1,
            client: crate::http_client(super::REQUEST_TIMEOUT),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// POST /api/chat, non-streaming chat completion.
    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, GenerationError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: self.model.clone(),
            messages,
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
            },
        };
        let res = self.client.post(&url).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }
        let data: ChatResponse = res.json().await?;
        data.message
            .map(|m| m.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| GenerationError::Api("ollama returned no content".to_string()))
    }
}

#[async_trait]
impl Generator for OllamaClient {
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
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatMessage>,
}
