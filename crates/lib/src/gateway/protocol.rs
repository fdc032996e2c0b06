//! Inbound Slack wire types: Events API JSON and slash-command form bodies.
//!
//! Everything is parsed into the closed [`InboundPayload`] / [`SlackEvent`] enums up front so
//! the dispatcher matches exhaustively instead of probing JSON fields.

use crate::error::GatewayError;
use serde::Deserialize;
use std::collections::HashMap;

/// A parsed inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundPayload {
    /// `url_verification`: echo the challenge.
    Handshake { challenge: String },
    /// `event_callback` with the provider's delivery id (`event_id`).
    EventCallback { id: String, event: SlackEvent },
    /// Slash command. Channel and user are optional here; the dispatcher validates them.
    CommandInvocation {
        name: String,
        args: String,
        channel: Option<String>,
        user: Option<String>,
        callback_ref: Option<String>,
    },
}

/// The inner `event` of an event callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlackEvent {
    /// The bot was @-mentioned in a channel.
    AppMention {
        channel: String,
        user: String,
        text: String,
        ts: String,
        thread_ts: Option<String>,
    },
    /// A plain user message in the bot's DM, possibly inside a DM thread.
    DirectMessage {
        channel: String,
        user: String,
        text: String,
        ts: String,
        thread_ts: Option<String>,
    },
    /// Edits, bot messages, system subtypes, channel chatter, unknown kinds.
    Other {
        kind: String,
        subtype: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type", default)]
    typ: String,
    #[serde(default)]
    challenge: Option<String>,
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    event: Option<RawEvent>,
}

#[derive(Debug, Default, Deserialize)]
struct RawEvent {
    #[serde(rename = "type", default)]
    typ: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    channel_type: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
}

impl RawEvent {
    fn classify(self) -> SlackEvent {
        let other = |typ: String, subtype: Option<String>| SlackEvent::Other {
            kind: typ,
            subtype,
        };
        if self.subtype.is_some() || self.bot_id.is_some() {
            return other(self.typ, self.subtype);
        }
        let (Some(channel), Some(user), Some(text), Some(ts)) =
            (self.channel, self.user, self.text, self.ts)
        else {
            return other(self.typ, None);
        };
        let is_dm = self.typ == "message"
            && self.channel_type.as_deref() == Some("im")
            && !text.trim().is_empty();
        if self.typ == "app_mention" {
            SlackEvent::AppMention {
                channel,
                user,
                text,
                ts,
                thread_ts: self.thread_ts,
            }
        } else if is_dm {
            SlackEvent::DirectMessage {
                channel,
                user,
                text,
                ts,
                thread_ts: self.thread_ts,
            }
        } else {
            other(self.typ, None)
        }
    }
}

/// Parse an Events API JSON body.
pub fn parse_json_payload(body: &[u8]) -> Result<InboundPayload, GatewayError> {
    let envelope: Envelope = serde_json::from_slice(body)
        .map_err(|e| GatewayError::MalformedPayload(format!("invalid json: {}", e)))?;
    match envelope.typ.as_str() {
        "url_verification" => {
            let challenge = envelope.challenge.ok_or_else(|| {
                GatewayError::MalformedPayload("url_verification without challenge".to_string())
            })?;
            Ok(InboundPayload::Handshake { challenge })
        }
        "event_callback" => {
            let id = envelope
                .event_id
                .filter(|id| !id.is_empty())
                .ok_or_else(|| {
                    GatewayError::MalformedPayload("event_callback without event_id".to_string())
                })?;
            let event = envelope.event.ok_or_else(|| {
                GatewayError::MalformedPayload("event_callback without event".to_string())
            })?;
            Ok(InboundPayload::EventCallback {
                id,
                event: event.classify(),
            })
        }
        "" => Err(GatewayError::MalformedPayload(
            "payload has no type".to_string(),
        )),
        other => Err(GatewayError::UnknownDeliveryKind(other.to_string())),
    }
}

/// Decode an `application/x-www-form-urlencoded` body into key/value pairs.
fn decode_form(body: &str) -> HashMap<String, String> {
    let decode = |s: &str| {
        let s = s.replace('+', " ");
        match urlencoding::decode(&s) {
            Ok(c) => c.into_owned(),
            Err(_) => s.clone(),
        }
    };
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let value = parts.next().unwrap_or("");
            Some((decode(key), decode(value)))
        })
        .collect()
}

/// Parse a slash-command form body.
pub fn parse_command_form(body: &[u8]) -> Result<InboundPayload, GatewayError> {
    let body = std::str::from_utf8(body)
        .map_err(|_| GatewayError::MalformedPayload("form body is not utf-8".to_string()))?;
    let mut params = decode_form(body);
    let nonempty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    let name = nonempty(params.remove("command"))
        .ok_or_else(|| GatewayError::MalformedPayload("form body has no command".to_string()))?;
    Ok(InboundPayload::CommandInvocation {
        name,
        args: params.remove("text").unwrap_or_default().trim().to_string(),
        channel: nonempty(params.remove("channel_id")),
        user: nonempty(params.remove("user_id")),
        callback_ref: nonempty(params.remove("response_url")),
    })
}
