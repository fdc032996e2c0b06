//! Chat platform collaborator (Slack).
//!
//! The worker talks to the platform only through the [`Messaging`] trait so tests can
//! substitute an in-memory implementation.

mod messaging;
mod slack;

pub use messaging::{FailureKind, HistoryRecord, Messaging, MessagingError};
pub use slack::{is_slack_callback_url, SlackClient, SLACK_API_BASE};
