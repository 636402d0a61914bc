use super::{Completion, LlmProvider, ProviderError};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub client: reqwest::Client,
}

impl OpenAiProvider {
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
impl LlmProvider for OpenAiProvider {
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
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// One call to an OpenAI-compatible `/chat/completions` endpoint.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn chat_completion(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    model: &str,
    temperature: f32,
    timeout: Duration,
    system_prompt: &str,
    user_prompt: &str,
    max_tokens: u32,
) -> Result<Completion, ProviderError> {
    let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));

    let body = json!({
        "model": model,
        "messages": [
            { "role": "system", "content": system_prompt },
            { "role": "user", "content": user_prompt }
        ],
        "temperature": temperature,
        "max_tokens": max_tokens,
    });

    let resp = client
        .post(&url)
        .bearer_auth(api_key)
        .timeout(timeout)
        .json(&body)
        .send()
        .await
        .map_err(|e| ProviderError::from_transport(&e, timeout))?;

    let status = resp.status();
    if !status.is_success() {
        let error_text = resp.text().await.unwrap_or_default();
        return Err(ProviderError::from_status(status.as_u16(), &error_text));
    }

    let json: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| ProviderError::Unavailable(format!("unreadable response body: {e}")))?;

    // choices[0].message.content; a missing field reads as empty text so the
    // generator reports EmptyResponse rather than a transport failure.
    let text = json
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let token_usage = json
        .pointer("/usage/total_tokens")
        .and_then(|v| v.as_u64())
        .map(|n| n as u32);

    Ok(Completion { text, token_usage })
}
