//! Scripted oracle for tests and local runs without an API key.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::oracle::{OracleError, OraclePrompt, ScoringOracle};

/// Replies from a queue first, then falls back to a default reply.
pub struct MockOracle {
    queued: Mutex<VecDeque<Result<String, OracleError>>>,
    default_response: Result<String, OracleError>,
    delay: Option<Duration>,
    call_count: AtomicU32,
    last_prompt: Mutex<Option<OraclePrompt>>,
}

impl MockOracle {
    /// A mock that always returns the same reply.
    pub fn with_fixed_response(response: &str) -> Self {
        Self::new(Ok(response.to_string()))
    }

    /// A mock whose every call fails.
    pub fn failing(error: OracleError) -> Self {
        Self::new(Err(error))
    }

    fn new(default_response: Result<String, OracleError>) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            default_response,
            delay: None,
            call_count: AtomicU32::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    /// Sleeps before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues a reply for the next call.
    pub fn push_response(&self, response: &str) {
        self.lock_queue().push_back(Ok(response.to_string()));
    }

    /// Queues a failure for the next call.
    pub fn push_error(&self, error: OracleError) {
        self.lock_queue().push_back(Err(error));
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_prompt(&self) -> Option<OraclePrompt> {
        self.last_prompt
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, OracleError>>> {
        self.queued
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ScoringOracle for MockOracle {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, prompt: &OraclePrompt) -> Result<String, OracleError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self
            .last_prompt
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(prompt.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.lock_queue().pop_front();
        next.unwrap_or_else(|| self.default_response.clone())
    }
}
