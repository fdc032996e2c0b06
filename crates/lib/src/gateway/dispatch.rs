//! Inbound dispatcher: answers every payload synchronously and hands slow work to the
//! fulfillment worker.
//!
//! `dispatch` is deliberately not async. It can only record, classify and spawn, so it can
//! never wait on the generator.

use crate::channels::is_slack_callback_url;
use crate::dedup::DedupCache;
use crate::fulfillment::{AddressingToken, Fulfiller, FulfillmentRequest, Outcome};
use crate::gateway::protocol::{InboundPayload, SlackEvent};
use crate::prompt;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;

const ACK_TEXT: &str = "Working on it…";

/// Synchronous answer to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Challenge(String),
    Ok,
    Duplicate,
    /// Visible only to the invoking user.
    Ephemeral(String),
}

impl Reply {
    pub fn to_json(&self) -> Value {
        match self {
            Reply::Challenge(c) => json!({ "challenge": c }),
            Reply::Ok => json!({ "status": "ok" }),
            Reply::Duplicate => json!({ "status": "ok", "message": "duplicate" }),
            Reply::Ephemeral(text) => json!({
                "status": "ok",
                "response_type": "ephemeral",
                "text": text,
            }),
        }
    }
}

/// Result of dispatching one payload: the reply, plus the worker run if one was scheduled.
pub struct Dispatched {
    pub reply: Reply,
    pub job: Option<JoinHandle<Outcome>>,
}

impl Dispatched {
    fn reply(reply: Reply) -> Self {
        Self { reply, job: None }
    }
}

/// Slash commands the gateway understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Summary of the invoking channel, sent to the user's DM.
    Summarize,
    /// Question about the invoking channel, answered via response_url (or DM).
    Ask,
}

impl Command {
    fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "/summarize" | "/summarise" => Some(Command::Summarize),
            "/ask" => Some(Command::Ask),
            _ => None,
        }
    }
}

pub struct Dispatcher {
    dedup: Arc<DedupCache>,
    fulfiller: Arc<Fulfiller>,
}

impl Dispatcher {
    pub fn new(dedup: Arc<DedupCache>, fulfiller: Arc<Fulfiller>) -> Self {
        Self { dedup, fulfiller }
    }

    pub fn dedup(&self) -> &DedupCache {
        &self.dedup
    }

    pub fn dispatch(&self, payload: InboundPayload) -> Dispatched {
        match payload {
            InboundPayload::Handshake { challenge } => {
                log::info!("url verification handshake");
                Dispatched::reply(Reply::Challenge(challenge))
            }
            InboundPayload::EventCallback { id, event } => self.dispatch_event(&id, event),
            InboundPayload::CommandInvocation {
                name,
                args,
                channel,
                user,
                callback_ref,
            } => self.dispatch_command(&name, args, channel, user, callback_ref),
        }
    }

    fn dispatch_event(&self, id: &str, event: SlackEvent) -> Dispatched {
        if self.dedup.seen_or_record(id) {
            log::info!("event {}: duplicate delivery, ignored", id);
            return Dispatched::reply(Reply::Duplicate);
        }
        let request = match event {
            SlackEvent::AppMention {
                channel,
                text,
                ts,
                thread_ts,
                ..
            } => FulfillmentRequest {
                question: question_or_summary(&prompt::strip_mentions(&text)),
                address: AddressingToken::Thread {
                    channel: channel.clone(),
                    thread_ts: Some(thread_ts.unwrap_or(ts)),
                },
                source_channel: channel,
            },
            SlackEvent::DirectMessage {
                channel,
                text,
                thread_ts,
                ..
            } => FulfillmentRequest {
                question: question_or_summary(&prompt::strip_mentions(&text)),
                address: AddressingToken::Thread {
                    channel: channel.clone(),
                    thread_ts,
                },
                source_channel: channel,
            },
            SlackEvent::Other { kind, subtype } => {
                log::debug!("event {}: ignoring {} (subtype {:?})", id, kind, subtype);
                return Dispatched::reply(Reply::Ok);
            }
        };
        log::info!("event {}: scheduling fulfillment in {}", id, request.source_channel);
        Dispatched {
            reply: Reply::Ok,
            job: Some(self.fulfiller.schedule(request)),
        }
    }

    fn dispatch_command(
        &self,
        name: &str,
        args: String,
        channel: Option<String>,
        user: Option<String>,
        callback_ref: Option<String>,
    ) -> Dispatched {
        let Some(command) = Command::parse(name) else {
            log::info!("unknown command {}", name);
            return Dispatched::reply(Reply::Ephemeral(format!(
                "Sorry, I don't know the command `{}`. Try `/summarize` or `/ask <question>`.",
                name
            )));
        };
        let Some(channel) = channel else {
            return Dispatched::reply(Reply::Ephemeral(format!(
                "Missing channel_id: `{}` has to be run from a channel or conversation.",
                name
            )));
        };
        let Some(user) = user else {
            return Dispatched::reply(Reply::Ephemeral(format!(
                "Missing user_id: I can't tell who ran `{}`.",
                name
            )));
        };

        let (request, ack) = match command {
            Command::Summarize => (
                FulfillmentRequest {
                    source_channel: channel,
                    address: AddressingToken::DirectUser { user },
                    question: question_or_summary(&args),
                },
                format!("{} I'll send the summary to you in a direct message.", ACK_TEXT),
            ),
            Command::Ask => {
                if args.is_empty() {
                    return Dispatched::reply(Reply::Ephemeral(
                        "Usage: `/ask <question>` to ask about the conversation in this channel."
                            .to_string(),
                    ));
                }
                let address = match callback_ref {
                    Some(response_url) if is_slack_callback_url(&response_url) => {
                        AddressingToken::Callback { response_url }
                    }
                    Some(response_url) => {
                        log::warn!(
                            "command {}: response_url {} is not a slack callback, answering in DM",
                            name,
                            response_url
                        );
                        AddressingToken::DirectUser { user }
                    }
                    None => AddressingToken::DirectUser { user },
                };
                (
                    FulfillmentRequest {
                        source_channel: channel,
                        address,
                        question: args,
                    },
                    ACK_TEXT.to_string(),
                )
            }
        };
        log::info!(
            "command {}: scheduling fulfillment in {}",
            name,
            request.source_channel
        );
        Dispatched {
            reply: Reply::Ephemeral(ack),
            job: Some(self.fulfiller.schedule(request)),
        }
    }
}

fn question_or_summary(text: &str) -> String {
    let t = text.trim();
    if t.is_empty() {
        prompt::DEFAULT_SUMMARY_QUESTION.to_string()
    } else {
        t.to_string()
    }
}
