//! Gateway HTTP server: one POST endpoint for Slack events and slash commands, plus health.

use crate::channels::{Messaging, SlackClient};
use crate::config::{Config, GenerationBackend, Settings};
use crate::dedup::DedupCache;
use crate::error::GatewayError;
use crate::fulfillment::Fulfiller;
use crate::gateway::dispatch::{Dispatcher, Reply};
use crate::gateway::protocol::{parse_command_form, parse_json_payload};
use crate::gateway::signature;
use crate::llm::{Generator, OllamaClient, OpenAiClient, OpenAiFlavor};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const RETRY_NUM_HEADER: &str = "X-Slack-Retry-Num";
const RETRY_REASON_HEADER: &str = "X-Slack-Retry-Reason";

/// Shared state for the gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub dispatcher: Arc<Dispatcher>,
    /// When Some, every inbound request must carry a valid Slack signature.
    pub signing_secret: Option<String>,
    pub port: u16,
}

impl GatewayState {
    pub fn new(dispatcher: Arc<Dispatcher>, signing_secret: Option<String>, port: u16) -> Self {
        Self {
            dispatcher,
            signing_secret,
            port,
        }
    }
}

/// Build the generation backend selected by settings.
fn build_generator(settings: &Settings) -> Arc<dyn Generator> {
    match settings.backend {
        GenerationBackend::Ollama => Arc::new(
            OllamaClient::new(settings.endpoint.clone(), settings.deployment.clone())
                .with_temperature(settings.temperature),
        ),
        GenerationBackend::Openai | GenerationBackend::Azure => {
            let flavor = if settings.backend == GenerationBackend::Azure {
                OpenAiFlavor::Azure {
                    api_version: settings.api_version.clone(),
                }
            } else {
                OpenAiFlavor::Standard
            };
            Arc::new(
                OpenAiClient::new(
                    settings.endpoint.clone(),
                    settings.api_key.clone().unwrap_or_default(),
                    settings.deployment.clone(),
                    flavor,
                )
                .with_sampling(settings.max_tokens, settings.temperature),
            )
        }
    }
}

/// Wire collaborators, dedup cache, worker and dispatcher from resolved settings.
pub fn build_state(settings: &Settings) -> GatewayState {
    let messaging: Arc<dyn Messaging> = Arc::new(SlackClient::new(
        settings.slack_token.clone(),
        settings.slack_api_base.clone(),
    ));
    let fulfiller = Fulfiller::new(messaging, build_generator(settings))
        .with_history_limit(settings.history_limit)
        .with_system_prompt(settings.system_prompt.clone())
        .with_generation_timeout(settings.generation_timeout);
    let dispatcher = Dispatcher::new(
        Arc::new(DedupCache::new(settings.dedup_ttl)),
        Arc::new(fulfiller),
    );
    GatewayState::new(
        Arc::new(dispatcher),
        settings.signing_secret.clone(),
        settings.port,
    )
}

/// Routes: `GET /` health, `POST /slack/events` and `POST /slack/commands` (same handler).
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/slack/events", post(slack_inbound))
        .route("/slack/commands", post(slack_inbound))
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

/// Resolve settings (failing fast on missing credentials), bind, and serve until SIGINT/SIGTERM.
pub async fn run_gateway(config: Config) -> Result<()> {
    let settings = Settings::resolve(&config).context("resolving settings")?;
    if settings.signing_secret.is_none() {
        log::warn!("no slack signing secret configured; inbound requests are not verified");
    }
    let state = build_state(&settings);
    let app = router(state);

    let bind_addr = format!("{}:{}", settings.bind, settings.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Completes on SIGINT or SIGTERM. Worker runs still in flight are abandoned.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

fn error_response(err: &GatewayError) -> Response {
    (err.status_code(), Json(json!({ "error": err.to_string() }))).into_response()
}

fn panic_response(_err: Box<dyn Any + Send + 'static>) -> Response {
    log::error!("handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal error" })),
    )
        .into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// POST /slack/events and /slack/commands: JSON events and url_verification, or form-encoded slash commands.
async fn slack_inbound(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(ref secret) = state.signing_secret {
        let timestamp = header_str(&headers, signature::TIMESTAMP_HEADER).unwrap_or("");
        let provided = header_str(&headers, signature::SIGNATURE_HEADER).unwrap_or("");
        if !signature::verify(secret, timestamp, &body, provided) {
            log::warn!("slack signature verification failed");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "invalid signature" })),
            )
                .into_response();
        }
    }
    if let Some(retry) = header_str(&headers, RETRY_NUM_HEADER) {
        log::info!(
            "slack retry #{} ({})",
            retry,
            header_str(&headers, RETRY_REASON_HEADER).unwrap_or("unknown reason")
        );
    }

    let is_form = header_str(&headers, header::CONTENT_TYPE.as_str())
        .map(|ct| ct.trim().to_ascii_lowercase().starts_with(FORM_CONTENT_TYPE))
        .unwrap_or(false);
    let parsed = if is_form {
        parse_command_form(&body)
    } else {
        parse_json_payload(&body)
    };

    let payload = match parsed {
        Ok(p) => p,
        Err(GatewayError::UnknownDeliveryKind(kind)) => {
            log::debug!("ignoring delivery kind {}", kind);
            return Json(Reply::Ok.to_json()).into_response();
        }
        Err(e) => {
            log::warn!("rejecting inbound request: {}", e);
            return error_response(&e);
        }
    };

    // The worker handle is dropped: the run continues detached.
    let dispatched = state.dispatcher.dispatch(payload);
    Json(dispatched.reply.to_json()).into_response()
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.port,
        "dedupEntries": state.dispatcher.dedup().len(),
    }))
}
