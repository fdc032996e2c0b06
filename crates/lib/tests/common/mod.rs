//! In-memory collaborators for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use lib::channels::{HistoryRecord, Messaging, MessagingError};
use lib::dedup::DedupCache;
use lib::fulfillment::Fulfiller;
use lib::gateway::Dispatcher;
use lib::llm::{GenerationError, Generator};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// One `send` call as seen by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub channel: String,
    pub text: String,
    pub blocks: Option<Value>,
    pub thread_ts: Option<String>,
}

/// One `post_to_callback` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Posted {
    pub url: String,
    pub text: String,
}

#[derive(Default)]
pub struct MockMessaging {
    pub history: Vec<HistoryRecord>,
    pub history_requests: Mutex<Vec<(String, usize)>>,
    pub sent: Mutex<Vec<Sent>>,
    pub opened: Mutex<Vec<String>>,
    pub posted: Mutex<Vec<Posted>>,
    pub fail_history: AtomicBool,
    pub fail_delivery: AtomicBool,
    /// Every `send` and `post_to_callback` call, failed ones included.
    pub delivery_attempts: AtomicUsize,
}

impl MockMessaging {
    pub fn with_history(history: Vec<HistoryRecord>) -> Self {
        Self {
            history,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub fn posted(&self) -> Vec<Posted> {
        self.posted.lock().unwrap().clone()
    }

    pub fn history_requests(&self) -> Vec<(String, usize)> {
        self.history_requests.lock().unwrap().clone()
    }

    pub fn delivery_attempts(&self) -> usize {
        self.delivery_attempts.load(Ordering::SeqCst)
    }

    fn delivery_result(&self) -> Result<(), MessagingError> {
        self.delivery_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_delivery.load(Ordering::SeqCst) {
            Err(MessagingError::Api("channel_not_found".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Messaging for MockMessaging {
    async fn fetch_history(
        &self,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, MessagingError> {
        self.history_requests
            .lock()
            .unwrap()
            .push((channel.to_string(), limit));
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(MessagingError::Api("not_in_channel".to_string()));
        }
        Ok(self.history.clone())
    }

    async fn send(
        &self,
        channel: &str,
        text: &str,
        blocks: Option<&Value>,
        thread_ts: Option<&str>,
    ) -> Result<(), MessagingError> {
        self.delivery_result()?;
        self.sent.lock().unwrap().push(Sent {
            channel: channel.to_string(),
            text: text.to_string(),
            blocks: blocks.cloned(),
            thread_ts: thread_ts.map(str::to_string),
        });
        Ok(())
    }

    async fn open_direct_conversation(&self, user: &str) -> Result<String, MessagingError> {
        self.opened.lock().unwrap().push(user.to_string());
        Ok(format!("D-{}", user))
    }

    async fn post_to_callback(
        &self,
        url: &str,
        text: &str,
        _blocks: Option<&Value>,
    ) -> Result<(), MessagingError> {
        self.delivery_result()?;
        self.posted.lock().unwrap().push(Posted {
            url: url.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}

/// Generator returning a fixed answer, optionally held until `release` is called.
pub struct MockGenerator {
    answer: String,
    gate: Option<Arc<Notify>>,
    fail: bool,
    pub calls: AtomicUsize,
    pub questions: Mutex<Vec<String>>,
}

impl MockGenerator {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            gate: None,
            fail: false,
            calls: AtomicUsize::new(0),
            questions: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::answering("")
        }
    }

    /// Hold every call until the returned gate is notified.
    pub fn gated(answer: &str) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let generator = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::answering(answer)
        };
        (generator, gate)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(
        &self,
        _system_prompt: &str,
        question: &str,
        _context: &str,
    ) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.questions.lock().unwrap().push(question.to_string());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            return Err(GenerationError::RateLimited("429 Too Many Requests".to_string()));
        }
        Ok(self.answer.clone())
    }
}

pub fn history() -> Vec<HistoryRecord> {
    vec![
        HistoryRecord {
            author: "U1".to_string(),
            text: "deploy failed on staging".to_string(),
            ts: "1700000000.000100".to_string(),
        },
        HistoryRecord {
            author: "U2".to_string(),
            text: "rolled back, looking into it".to_string(),
            ts: "1700000001.000200".to_string(),
        },
    ]
}

pub fn dispatcher(messaging: Arc<MockMessaging>, generator: Arc<MockGenerator>) -> Dispatcher {
    dispatcher_with_timeout(messaging, generator, Duration::from_secs(5))
}

pub fn dispatcher_with_timeout(
    messaging: Arc<MockMessaging>,
    generator: Arc<MockGenerator>,
    generation_timeout: Duration,
) -> Dispatcher {
    let fulfiller = Fulfiller::new(messaging, generator)
        .with_history_limit(20)
        .with_generation_timeout(generation_timeout);
    Dispatcher::new(
        Arc::new(DedupCache::new(Duration::from_secs(300))),
        Arc::new(fulfiller),
    )
}
