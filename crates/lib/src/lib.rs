//! Parley core library: Slack event ingestion, delivery dedup, asynchronous fulfillment,
//! and Block Kit rendering. Used by the `parley` CLI.

pub mod channels;
pub mod config;
pub mod dedup;
pub mod error;
pub mod fulfillment;
pub mod gateway;
pub mod llm;
pub mod prompt;
pub mod render;

use std::time::Duration;

/// HTTP client with a whole-request timeout, so a hung backend surfaces as an error.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}
