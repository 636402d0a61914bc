use super::openai::chat_completion;
use super::{Completion, LlmProvider, ProviderError};
use async_trait::async_trait;
use std::time::Duration;

/// NVIDIA NIM speaks the OpenAI chat-completions dialect on its own host.
pub const DEFAULT_BASE_URL: &str = "https://integrate.api.nvidia.com/v1";

pub struct NimProvider {
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub client: reqwest::Client,
}

impl NimProvider {
    pub fn new(
        model: String,
        api_key: String,
        base_url: Option<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Self {
        Self {
            model,
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            temperature,
            timeout,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for NimProvider {
    async fn invoke(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<Completion, ProviderError> {
        chat_completion(
            &self.client,
            &self.base_url,
            &self.api_key,
            &self.model,
            self.temperature,
            self.timeout,
            system_prompt,
            user_prompt,
            max_tokens,
        )
        .await
    }

    fn provider_name(&self) -> &'static str {
        "nvidia"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
