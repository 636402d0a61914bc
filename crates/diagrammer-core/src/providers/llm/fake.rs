use super::{Completion, LlmProvider, ProviderError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Scripted provider for tests and offline runs.
///
/// Replies are consumed in order; once the script is exhausted the last reply
/// repeats. Every call is counted.
pub struct FakeProvider {
    model: String,
    script: Mutex<VecDeque<Result<Completion, ProviderError>>>,
    last: Mutex<Option<Result<Completion, ProviderError>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(replies: Vec<Result<Completion, ProviderError>>) -> Self {
        Self {
            model: "fake-model".to_string(),
            script: Mutex::new(replies.into()),
            last: Mutex::new(None),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always answers with `text`.
    pub fn always(text: &str) -> Self {
        Self::new(vec![Ok(Completion {
            text: text.to_string(),
            token_usage: Some(17),
        })])
    }

    /// Always fails with `err`.
    pub fn failing(err: ProviderError) -> Self {
        Self::new(vec![Err(err)])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> Result<Completion, ProviderError> {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(reply) = script.pop_front() {
            *last = Some(reply.clone());
            return reply;
        }
        last.clone()
            .unwrap_or_else(|| Err(ProviderError::Unavailable("fake script is empty".into())))
    }
}

#[async_trait]
impl LlmProvider for FakeProvider {
    async fn invoke(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        _max_tokens: u32,
    ) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.next_reply()
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
