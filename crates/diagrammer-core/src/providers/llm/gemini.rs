use super::{Completion, LlmProvider, ProviderError};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub client: reqwest::Client,
}

impl GeminiProvider {
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
impl LlmProvider for GeminiProvider {
    async fn invoke(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<Completion, ProviderError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );

        let body = json!({
            "systemInstruction": { "parts": [{ "text": system_prompt }] },
            "contents": [{ "role": "user", "parts": [{ "text": user_prompt }] }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": max_tokens,
            }
        });

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(&e, self.timeout))?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &error_text));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("unreadable response body: {e}")))?;

        Ok(parse_response(&json))
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Joins the text parts of the first candidate.
fn parse_response(json: &serde_json::Value) -> Completion {
    let text = json
        .pointer("/candidates/0/content/parts")
        .and_then(|v| v.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let token_usage = json
        .pointer("/usageMetadata/totalTokenCount")
        .and_then(|v| v.as_u64())
        .map(|n| n as u32);

    Completion { text, token_usage }
}
