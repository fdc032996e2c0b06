//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.parley/config.json`) and environment.
//! [`Settings::resolve`] turns it into the read-only runtime settings and fails when a
//! required credential is missing.

use crate::error::GatewayError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Slack credentials and API base.
    #[serde(default)]
    pub slack: SlackConfig,

    /// Language model backend.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Worker and dedup tuning.
    #[serde(default)]
    pub fulfillment: FulfillmentConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 3000). Overridden by PORT env.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0"). Overridden by HOST env.
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Slack app settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    /// Bot token (xoxb-...). Overridden by SLACK_BOT_TOKEN env.
    pub bot_token: Option<String>,
    /// Signing secret for request verification. Overridden by SLACK_SIGNING_SECRET env.
    /// When unset, inbound requests are not verified.
    pub signing_secret: Option<String>,
    /// Web API base (default https://slack.com/api). Useful for tests.
    pub api_base: Option<String>,
}

/// Which generation backend to call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationBackend {
    /// Azure OpenAI deployment.
    #[default]
    Azure,
    /// api.openai.com or any OpenAI-compatible server.
    Openai,
    /// Local Ollama.
    Ollama,
}

/// Generation backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(default)]
    pub backend: GenerationBackend,
    /// API key. Overridden by OPENAI_API_KEY env. Not needed for ollama.
    pub api_key: Option<String>,
    /// Endpoint base URL. Overridden by OPENAI_API_DOMAIN env. Required for azure.
    pub endpoint: Option<String>,
    /// Model id, or deployment name for azure (default "gpt-4"). Overridden by OPENAI_API_DEPLOYMENT env.
    #[serde(default = "default_deployment")]
    pub deployment: String,
    /// Azure api-version query parameter.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_deployment() -> String {
    "gpt-4".to_string()
}

fn default_api_version() -> String {
    "2024-02-15-preview".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.1
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: GenerationBackend::default(),
            api_key: None,
            endpoint: None,
            deployment: default_deployment(),
            api_version: default_api_version(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Worker and dedup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentConfig {
    /// Messages of channel history handed to the model (default 20).
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Seconds a delivery id is remembered for dedup (default 300).
    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,
    /// Replaces the built-in system prompt when set.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Upper bound on one generation call before the run fails with a notice (default 120).
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,
}

fn default_history_limit() -> usize {
    20
}

fn default_dedup_ttl_secs() -> u64 {
    300
}

fn default_generation_timeout_secs() -> u64 {
    120
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            dedup_ttl_secs: default_dedup_ttl_secs(),
            system_prompt: None,
            generation_timeout_secs: default_generation_timeout_secs(),
        }
    }
}

/// Where environment overrides come from. [`process_env`] in the binary; tests pass a closure.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Read a trimmed, non-empty env var from the process environment.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn config_nonempty(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the Slack bot token: env SLACK_BOT_TOKEN overrides config.
pub fn resolve_slack_token(config: &Config, env: EnvLookup) -> Option<String> {
    env("SLACK_BOT_TOKEN").or_else(|| config_nonempty(&config.slack.bot_token))
}

/// Resolve the Slack signing secret: env SLACK_SIGNING_SECRET overrides config.
pub fn resolve_signing_secret(config: &Config, env: EnvLookup) -> Option<String> {
    env("SLACK_SIGNING_SECRET").or_else(|| config_nonempty(&config.slack.signing_secret))
}

/// Resolve the generation API key: env OPENAI_API_KEY overrides config.
pub fn resolve_api_key(config: &Config, env: EnvLookup) -> Option<String> {
    env("OPENAI_API_KEY").or_else(|| config_nonempty(&config.generation.api_key))
}

/// Resolve the generation endpoint: env OPENAI_API_DOMAIN overrides config.
pub fn resolve_endpoint(config: &Config, env: EnvLookup) -> Option<String> {
    env("OPENAI_API_DOMAIN").or_else(|| config_nonempty(&config.generation.endpoint))
}

/// Resolve the model/deployment id: env OPENAI_API_DEPLOYMENT overrides config.
pub fn resolve_deployment(config: &Config, env: EnvLookup) -> String {
    env("OPENAI_API_DEPLOYMENT").unwrap_or_else(|| config.generation.deployment.clone())
}

/// Apply HOST and PORT env overrides to the gateway section.
pub fn apply_listen_env(config: &mut Config) {
    if let Some(host) = process_env("HOST") {
        config.gateway.bind = host;
    }
    if let Some(port) = process_env("PORT").and_then(|p| p.parse().ok()) {
        config.gateway.port = port;
    }
}

/// Runtime settings resolved once at startup. Read-only afterwards.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: String,
    pub port: u16,
    pub slack_token: String,
    pub signing_secret: Option<String>,
    pub slack_api_base: Option<String>,
    pub backend: GenerationBackend,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub deployment: String,
    pub api_version: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub history_limit: usize,
    pub dedup_ttl: Duration,
    pub system_prompt: Option<String>,
    pub generation_timeout: Duration,
}

impl Settings {
    /// Resolve process env overrides and check required values. Every missing key is reported
    /// at once.
    pub fn resolve(config: &Config) -> Result<Self, GatewayError> {
        Self::resolve_with(config, &process_env)
    }

    /// Same as [`resolve`](Self::resolve) with overrides read from `env`.
    pub fn resolve_with(config: &Config, env: EnvLookup) -> Result<Self, GatewayError> {
        let mut missing = Vec::new();
        let slack_token = resolve_slack_token(config, env);
        if slack_token.is_none() {
            missing.push("slack.botToken (SLACK_BOT_TOKEN)".to_string());
        }
        let backend = config.generation.backend;
        let api_key = resolve_api_key(config, env);
        let endpoint = resolve_endpoint(config, env);
        if backend != GenerationBackend::Ollama && api_key.is_none() {
            missing.push("generation.apiKey (OPENAI_API_KEY)".to_string());
        }
        if backend == GenerationBackend::Azure && endpoint.is_none() {
            missing.push("generation.endpoint (OPENAI_API_DOMAIN)".to_string());
        }
        let Some(slack_token) = slack_token else {
            return Err(GatewayError::ConfigurationMissing(missing));
        };
        if !missing.is_empty() {
            return Err(GatewayError::ConfigurationMissing(missing));
        }
        Ok(Self {
            bind: config.gateway.bind.trim().to_string(),
            port: config.gateway.port,
            slack_token,
            signing_secret: resolve_signing_secret(config, env),
            slack_api_base: config_nonempty(&config.slack.api_base),
            backend,
            api_key,
            endpoint,
            deployment: resolve_deployment(config, env),
            api_version: config.generation.api_version.clone(),
            max_tokens: config.generation.max_tokens,
            temperature: config.generation.temperature,
            history_limit: config.fulfillment.history_limit.max(1),
            dedup_ttl: Duration::from_secs(config.fulfillment.dedup_ttl_secs),
            system_prompt: config_nonempty(&config.fulfillment.system_prompt),
            generation_timeout: Duration::from_secs(
                config.fulfillment.generation_timeout_secs.max(1),
            ),
        })
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("PARLEY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".parley").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, PARLEY_CONFIG_PATH, or the default. Missing file => default
/// config (credentials can come from env alone). Returns the config and the path used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    apply_listen_env(&mut config);
    Ok((config, path))
}
