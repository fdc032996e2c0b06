//! Fulfillment worker: fetch channel history, ask the generator, render, and deliver the
//! answer out-of-band.
//!
//! Each [`FulfillmentRequest`] is consumed by exactly one run. A run ends in one of three
//! states: delivered, failed with a notice sent to the user, or failed silently when the
//! notice itself could not be delivered. The notice is attempted once.

use crate::channels::{FailureKind, Messaging, MessagingError};
use crate::error::GatewayError;
use crate::llm::{GenerationError, Generator};
use crate::prompt;
use crate::render::{render, RenderedMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Default bound on one generation call.
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Where the asynchronous answer goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressingToken {
    /// Post in `channel`; as a threaded reply when `thread_ts` is set.
    Thread {
        channel: String,
        thread_ts: Option<String>,
    },
    /// Slash-command response_url.
    Callback { response_url: String },
    /// Open a DM with the user, then post there.
    DirectUser { user: String },
}

/// One unit of work for the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillmentRequest {
    /// Channel whose history is the context for the question.
    pub source_channel: String,
    pub address: AddressingToken,
    pub question: String,
}

/// Terminal state of a run.
#[derive(Debug)]
pub enum Outcome {
    Delivered,
    FailedThenNotified(GatewayError),
    FailedSilently(GatewayError),
}

impl Outcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Outcome::Delivered)
    }
}

/// Which step failed.
#[derive(Debug, thiserror::Error)]
enum StepFailure {
    #[error("history fetch failed: {0}")]
    History(MessagingError),
    #[error("generation failed: {0}")]
    Generation(GenerationError),
    #[error("delivery failed: {0}")]
    Delivery(MessagingError),
}

impl StepFailure {
    fn user_message(&self) -> String {
        match self {
            StepFailure::History(e) => {
                format!("I couldn't read the conversation history ({})", e.user_message())
            }
            StepFailure::Generation(e) => e.user_message().to_string(),
            StepFailure::Delivery(e) => {
                format!("I couldn't post the answer ({})", e.user_message())
            }
        }
    }

    fn transient(&self) -> bool {
        match self {
            StepFailure::History(e) | StepFailure::Delivery(e) => {
                e.kind() == FailureKind::Transient
            }
            StepFailure::Generation(GenerationError::Api(_)) => false,
            StepFailure::Generation(_) => true,
        }
    }

    fn into_gateway_error(self) -> GatewayError {
        let collaborator = match self {
            StepFailure::History(_) | StepFailure::Delivery(_) => "slack",
            StepFailure::Generation(_) => "generation",
        };
        GatewayError::CollaboratorUnavailable {
            collaborator,
            reason: self.to_string(),
        }
    }
}

/// Plain-text notice sent in place of the answer when a run fails.
pub fn failure_notice(user_message: &str) -> String {
    format!(
        ":warning: Sorry, I couldn't finish that request: {}. Please try again.",
        user_message
    )
}

/// Runs fulfillment requests against the messaging and generation collaborators.
pub struct Fulfiller {
    messaging: Arc<dyn Messaging>,
    generator: Arc<dyn Generator>,
    history_limit: usize,
    system_prompt: Option<String>,
    generation_timeout: Duration,
}

impl Fulfiller {
    pub fn new(messaging: Arc<dyn Messaging>, generator: Arc<dyn Generator>) -> Self {
        Self {
            messaging,
            generator,
            history_limit: 20,
            system_prompt: None,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt;
        self
    }

    /// A generation call still pending after `timeout` fails the run as a connection error.
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    /// Start a detached run. The caller may await the handle or drop it.
    pub fn schedule(self: &Arc<Self>, request: FulfillmentRequest) -> JoinHandle<Outcome> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(request).await })
    }

    /// Run one request to completion.
    pub async fn run(&self, request: FulfillmentRequest) -> Outcome {
        let job = format!("job-{}", uuid::Uuid::new_v4());
        log::info!(
            "{}: running for channel {} -> {:?}",
            job,
            request.source_channel,
            request.address
        );

        let failure = match self.answer(&request).await {
            Ok(message) => match self.deliver(&request.address, &message).await {
                Ok(()) => {
                    log::info!("{}: delivered", job);
                    return Outcome::Delivered;
                }
                Err(e) => StepFailure::Delivery(e),
            },
            Err(failure) => failure,
        };

        if failure.transient() {
            log::warn!("{}: {}", job, failure);
        } else {
            log::error!("{}: {}", job, failure);
        }

        let notice = RenderedMessage::plain(failure_notice(&failure.user_message()));
        match self.deliver(&request.address, &notice).await {
            Ok(()) => {
                log::info!("{}: failure notice delivered", job);
                Outcome::FailedThenNotified(failure.into_gateway_error())
            }
            Err(e) => {
                log::error!("{}: failure notice not delivered, giving up: {}", job, e);
                Outcome::FailedSilently(failure.into_gateway_error())
            }
        }
    }

    async fn answer(&self, request: &FulfillmentRequest) -> Result<RenderedMessage, StepFailure> {
        let history = self
            .messaging
            .fetch_history(&request.source_channel, self.history_limit)
            .await
            .map_err(StepFailure::History)?;
        let context = prompt::format_context(&history);
        let system_prompt = prompt::build_system_prompt(self.system_prompt.as_deref());
        let generation = self
            .generator
            .generate(&system_prompt, &request.question, &context);
        let text = match tokio::time::timeout(self.generation_timeout, generation).await {
            Ok(result) => result.map_err(StepFailure::Generation)?,
            Err(_) => {
                return Err(StepFailure::Generation(GenerationError::Connection(format!(
                    "no response within {:?}",
                    self.generation_timeout
                ))))
            }
        };
        Ok(render(&text))
    }

    async fn deliver(
        &self,
        address: &AddressingToken,
        message: &RenderedMessage,
    ) -> Result<(), MessagingError> {
        let blocks = message.blocks_json();
        match address {
            AddressingToken::Thread { channel, thread_ts } => {
                self.messaging
                    .send(
                        channel,
                        &message.fallback_text,
                        blocks.as_ref(),
                        thread_ts.as_deref(),
                    )
                    .await
            }
            AddressingToken::Callback { response_url } => {
                self.messaging
                    .post_to_callback(response_url, &message.fallback_text, blocks.as_ref())
                    .await
            }
            AddressingToken::DirectUser { user } => {
                let dm = self.messaging.open_direct_conversation(user).await?;
                self.messaging
                    .send(&dm, &message.fallback_text, blocks.as_ref(), None)
                    .await
            }
        }
    }
}
