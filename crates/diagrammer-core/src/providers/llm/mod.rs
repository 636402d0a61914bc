use crate::config::{LlmConfig, ProviderKind};
use crate::errors::truncate_detail;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod fake;
pub mod gemini;
pub mod nim;
pub mod openai;

/// Text returned by a provider for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub token_usage: Option<u32>,
}

/// Provider failures, split by what the retry policy should do with them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("provider call timed out after {0}ms")]
    Timeout(u64),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited(_) | ProviderError::Unavailable(_) | ProviderError::Timeout(_)
        )
    }

    /// Maps a non-success HTTP status and body onto a category.
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = format!("HTTP {}: {}", status, truncate_detail(body));
        match status {
            429 => ProviderError::RateLimited(detail),
            401 | 403 => ProviderError::Unauthorized(detail),
            400 | 404 | 422 => ProviderError::MalformedRequest(detail),
            _ => ProviderError::Unavailable(detail),
        }
    }

    pub fn from_transport(e: &reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout(timeout.as_millis() as u64)
        } else {
            ProviderError::Unavailable(truncate_detail(&e.to_string()))
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn invoke(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<Completion, ProviderError>;

    fn provider_name(&self) -> &'static str;

    fn model(&self) -> &str;
}

/// Builds the HTTP provider selected by configuration.
pub fn from_config(cfg: &LlmConfig) -> Option<Arc<dyn LlmProvider>> {
    let api_key = cfg.api_key.clone().filter(|k| !k.trim().is_empty())?;
    let timeout = Duration::from_millis(cfg.request_timeout_ms);
    let provider: Arc<dyn LlmProvider> = match cfg.provider {
        ProviderKind::Openai => Arc::new(openai::OpenAiProvider::new(
            cfg.model_name(),
            api_key,
            cfg.base_url.clone(),
            cfg.temperature,
            timeout,
        )),
        ProviderKind::Nvidia => Arc::new(nim::NimProvider::new(
            cfg.model_name(),
            api_key,
            cfg.base_url.clone(),
            cfg.temperature,
            timeout,
        )),
        ProviderKind::Gemini => Arc::new(gemini::GeminiProvider::new(
            cfg.model_name(),
            api_key,
            cfg.base_url.clone(),
            cfg.temperature,
            timeout,
        )),
    };
    Some(provider)
}
