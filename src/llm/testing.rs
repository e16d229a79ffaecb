//! In-memory backend double for tests.

use super::backend::{BackendError, CompletionBackend, CompletionRequest};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

type Reply = Result<String, BackendError>;

/// Replays scripted replies in order and records every request it sees.
///
/// Once the script runs out, the fallback reply (if any) repeats forever;
/// without one, further calls fail with a non-retryable error.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Option<Reply>,
    calls: Mutex<Vec<(Instant, CompletionRequest)>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always(reply: Reply) -> Self {
        Self {
            fallback: Some(reply),
            ..Self::new(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, request)| request.clone())
            .collect()
    }

    /// Time elapsed between consecutive calls
    pub fn call_gaps(&self) -> Vec<Duration> {
        let calls = self.calls.lock().unwrap();
        calls.windows(2).map(|w| w[1].0 - w[0].0).collect()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn generate(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), request.clone()));

        let next = self.replies.lock().unwrap().pop_front();
        match next.or_else(|| self.fallback.clone()) {
            Some(reply) => reply,
            None => Err(BackendError::new("script exhausted").with_status(400)),
        }
    }
}
