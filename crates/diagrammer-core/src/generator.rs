use crate::config::{AppConfig, RetryConfig};
use crate::errors::{GenerationError, GenerationErrorKind};
use crate::model::{DiagramKind, MarkupArtifact, MarkupSource, ModelIdentity};
use crate::prompts::system_prompt;
use crate::providers::llm::{self, Completion, LlmProvider, ProviderError};
use crate::templates::template_for;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

pub const TEMPLATE_PROVIDER: &str = "template";
pub const TEMPLATE_MODEL: &str = "builtin";

/// How markup gets produced. Chosen once, at construction.
#[derive(Clone)]
pub enum GeneratorStrategy {
    Provider(Arc<dyn LlmProvider>),
    /// Deterministic keyword templates; no network.
    Template,
}

#[derive(Clone)]
pub struct MarkupGenerator {
    strategy: GeneratorStrategy,
    retry: RetryConfig,
    max_tokens: u32,
    call_timeout: Duration,
}

impl MarkupGenerator {
    pub fn new(
        strategy: GeneratorStrategy,
        retry: RetryConfig,
        max_tokens: u32,
        call_timeout: Duration,
    ) -> Self {
        Self {
            strategy,
            retry,
            max_tokens,
            call_timeout,
        }
    }

    /// Uses the configured provider, or templates when it has no API key.
    pub fn from_config(cfg: &AppConfig) -> Self {
        let strategy = match llm::from_config(&cfg.llm) {
            Some(provider) => GeneratorStrategy::Provider(provider),
            None => {
                tracing::warn!(
                    event = "generator.fallback",
                    provider = cfg.llm.provider.as_str(),
                    "no API key configured; using built-in templates"
                );
                GeneratorStrategy::Template
            }
        };
        Self::new(
            strategy,
            cfg.retry.clone(),
            cfg.llm.max_tokens,
            Duration::from_millis(cfg.llm.request_timeout_ms),
        )
    }

    pub fn identity(&self) -> ModelIdentity {
        match &self.strategy {
            GeneratorStrategy::Provider(p) => ModelIdentity::new(p.provider_name(), p.model()),
            GeneratorStrategy::Template => ModelIdentity::new(TEMPLATE_PROVIDER, TEMPLATE_MODEL),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.strategy, GeneratorStrategy::Template)
    }

    pub async fn generate(
        &self,
        prompt: &str,
        kind: DiagramKind,
    ) -> Result<MarkupArtifact, GenerationError> {
        let start = Instant::now();
        let provider = match &self.strategy {
            GeneratorStrategy::Template => return Ok(self.from_template(prompt, kind, start)),
            GeneratorStrategy::Provider(p) => p,
        };

        let (completion, attempts) = self.invoke_with_retry(provider.as_ref(), prompt, kind).await?;
        let sanitized = sanitize_markup(&completion.text);
        if sanitized.is_empty() {
            return Err(GenerationError::new(
                GenerationErrorKind::EmptyResponse,
                format!("{} returned no markup", provider.provider_name()),
                attempts,
            ));
        }

        let latency_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            event = "generator.done",
            provider = provider.provider_name(),
            model = provider.model(),
            kind = kind.as_str(),
            attempts,
            tokens = ?completion.token_usage,
            latency_ms,
            markup_len = sanitized.len()
        );

        Ok(MarkupArtifact {
            raw_markup: completion.text,
            sanitized_markup: sanitized,
            source: MarkupSource {
                provider: provider.provider_name().to_string(),
                model: provider.model().to_string(),
                token_usage: completion.token_usage,
                latency_ms,
                attempts,
                fallback: false,
            },
        })
    }

    fn from_template(&self, prompt: &str, kind: DiagramKind, start: Instant) -> MarkupArtifact {
        let markup = template_for(prompt, kind);
        tracing::info!(event = "generator.template", kind = kind.as_str());
        MarkupArtifact {
            raw_markup: markup.to_string(),
            sanitized_markup: sanitize_markup(markup),
            source: MarkupSource {
                provider: TEMPLATE_PROVIDER.to_string(),
                model: TEMPLATE_MODEL.to_string(),
                token_usage: None,
                latency_ms: start.elapsed().as_millis() as u64,
                attempts: 1,
                fallback: true,
            },
        }
    }

    async fn invoke_with_retry(
        &self,
        provider: &dyn LlmProvider,
        prompt: &str,
        kind: DiagramKind,
    ) -> Result<(Completion, u32), GenerationError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let system = system_prompt(kind);
        let mut last_error = ProviderError::Unavailable("no attempts made".into());

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = backoff_delay(&self.retry, attempt - 1);
                tracing::debug!(event = "generator.backoff", attempt, delay_ms = delay.as_millis() as u64);
                tokio::time::sleep(delay).await;
            }

            let call = provider.invoke(system, prompt.trim(), self.max_tokens);
            let result = match tokio::time::timeout(self.call_timeout, call).await {
                Ok(r) => r,
                Err(_) => Err(ProviderError::Timeout(self.call_timeout.as_millis() as u64)),
            };

            match result {
                Ok(completion) => return Ok((completion, attempt)),
                Err(e) if !e.is_transient() => {
                    tracing::warn!(
                        event = "generator.rejected",
                        provider = provider.provider_name(),
                        attempt,
                        error = %e
                    );
                    return Err(GenerationError::new(
                        GenerationErrorKind::ProviderRejected,
                        e.to_string(),
                        attempt,
                    ));
                }
                Err(e) => {
                    tracing::warn!(
                        event = "generator.transient_error",
                        provider = provider.provider_name(),
                        attempt,
                        max_attempts,
                        error = %e
                    );
                    last_error = e;
                }
            }
        }

        let kind = match last_error {
            ProviderError::Timeout(_) => GenerationErrorKind::Timeout,
            _ => GenerationErrorKind::ProviderUnavailable,
        };
        Err(GenerationError::new(kind, last_error.to_string(), max_attempts))
    }
}

/// Delay before retry number `retry` (1-based): exponential, capped, optionally jittered up to +30%.
pub fn backoff_delay(cfg: &RetryConfig, retry: u32) -> Duration {
    let exp = cfg.multiplier.powi(retry.saturating_sub(1) as i32);
    let base_ms = (cfg.initial_backoff_ms as f64 * exp).min(cfg.max_backoff_ms as f64);
    let ms = if cfg.jitter {
        base_ms * (1.0 + rand::random::<f64>() * 0.3)
    } else {
        base_ms
    };
    Duration::from_micros((ms.max(0.0) * 1000.0).round() as u64)
}

const FENCE: &str = "```";

// Words that open markup and must never be mistaken for a fence language tag.
const MARKUP_OPENERS: [&str; 4] = ["graph", "digraph", "strict", "gantt"];

fn fence_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_+.\-]*$").expect("static fence tag regex"))
}

fn is_fence_tag(word: &str) -> bool {
    fence_tag_re().is_match(word)
        && !MARKUP_OPENERS.contains(&word.to_ascii_lowercase().as_str())
}

/// Drops the language tag that may follow an opening fence, on its own line or inline.
fn strip_fence_tag(body: &str) -> &str {
    let body = body.trim_start_matches([' ', '\t']);
    let (first, rest) = match body.find(char::is_whitespace) {
        Some(i) => body.split_at(i),
        None => (body, ""),
    };
    if is_fence_tag(first) {
        rest
    } else {
        body
    }
}

/// Strips code fences and language tags from an LLM reply.
///
/// A fenced block wins over surrounding prose, whether or not its fences sit
/// on their own lines. A lone fence is an unclosed opener when text follows it
/// and a dangling closer otherwise.
pub fn sanitize_markup(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(open) = trimmed.find(FENCE) else {
        return trimmed.to_string();
    };

    let before = &trimmed[..open];
    let after = &trimmed[open + FENCE.len()..];
    let body = match after.find(FENCE) {
        Some(close) => strip_fence_tag(&after[..close]),
        None if after.trim().is_empty() => before,
        None => strip_fence_tag(after),
    };
    body.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fence_with_language_tag() {
        let body = "digraph g {\n    a -> b;\n}";
        let raw = format!("```dot\n{}\n```", body);
        assert_eq!(sanitize_markup(&raw), body);
    }

    #[test]
    fn strips_fence_surrounded_by_prose() {
        let raw = "Here you go:\n```plantuml\n@startwbs\n* A\n@endwbs\n```\nEnjoy!";
        assert_eq!(sanitize_markup(raw), "@startwbs\n* A\n@endwbs");
    }

    #[test]
    fn unfenced_output_is_only_trimmed() {
        let raw = "  \n gantt\n    title T\n  ";
        assert_eq!(sanitize_markup(raw), "gantt\n    title T");
    }

    #[test]
    fn dangling_fences_are_removed() {
        assert_eq!(sanitize_markup("```mermaid\ngantt\n  title X"), "gantt\n  title X");
        assert_eq!(sanitize_markup("graph g { a -- b }\n```"), "graph g { a -- b }");
    }

    #[test]
    fn closing_fence_on_markup_line() {
        assert_eq!(
            sanitize_markup("```dot\ndigraph g { a -> b }```"),
            "digraph g { a -> b }"
        );
        assert_eq!(sanitize_markup("digraph g { a -> b }```"), "digraph g { a -> b }");
    }

    #[test]
    fn single_line_fence_keeps_markup() {
        assert_eq!(
            sanitize_markup("```dot digraph g { a -> b }```"),
            "digraph g { a -> b }"
        );
        assert_eq!(
            sanitize_markup("```digraph g { a -> b }```"),
            "digraph g { a -> b }"
        );
    }

    #[test]
    fn markup_keyword_is_not_a_language_tag() {
        assert_eq!(
            sanitize_markup("```gantt\n    title T\n```"),
            "gantt\n    title T"
        );
        assert_eq!(
            sanitize_markup("```\r\ngraph g { a -- b }\r\n```"),
            "graph g { a -- b }"
        );
    }

    #[test]
    fn fence_only_output_is_empty() {
        assert_eq!(sanitize_markup("```\n\n```"), "");
        assert_eq!(sanitize_markup("   "), "");
    }

    #[test]
    fn backoff_grows_and_caps_without_jitter() {
        let cfg = RetryConfig {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 250,
            multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(backoff_delay(&cfg, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(&cfg, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(&cfg, 3), Duration::from_millis(250));
    }

    #[test]
    fn jitter_stays_within_thirty_percent() {
        let cfg = RetryConfig {
            initial_backoff_ms: 1000,
            jitter: true,
            ..RetryConfig::default()
        };
        for _ in 0..50 {
            let d = backoff_delay(&cfg, 1).as_millis();
            assert!((1000..=1300).contains(&d), "{d}");
        }
    }
}
