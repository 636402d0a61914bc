use crate::errors::ConfigError;
use crate::model::DiagramKind;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Openai,
    Nvidia,
    Gemini,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Openai => "openai",
            ProviderKind::Nvidia => "nvidia",
            ProviderKind::Gemini => "gemini",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::Openai),
            "nvidia" => Ok(ProviderKind::Nvidia),
            "gemini" => Ok(ProviderKind::Gemini),
            other => Err(ConfigError(format!(
                "invalid llm provider '{}': must be one of openai, nvidia, gemini",
                other
            ))),
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Openai => "gpt-4o-mini",
            ProviderKind::Nvidia => "meta/llama-3.1-70b-instruct",
            ProviderKind::Gemini => "gemini-1.5-flash",
        }
    }
}

/// Top-level configuration, built once at startup and handed to constructors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(rename = "configVersion", alias = "version")]
    pub version: u32,
    pub llm: LlmConfig,
    pub retry: RetryConfig,
    pub render: RenderConfig,
    pub limits: LimitsConfig,
    pub cache: CacheConfig,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: SUPPORTED_CONFIG_VERSION,
            llm: LlmConfig::default(),
            retry: RetryConfig::default(),
            render: RenderConfig::default(),
            limits: LimitsConfig::default(),
            cache: CacheConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout_ms: u64,
}

impl LlmConfig {
    pub fn model_name(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            api_key: None,
            model: None,
            base_url: None,
            max_tokens: 1024,
            temperature: 0.3,
            request_timeout_ms: 30_000,
        }
    }
}

// Hand-written so the API key never reaches a log line.
impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 8000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub timeout_ms: u64,
    pub graphviz_bin: PathBuf,
    pub plantuml_url: String,
    pub mermaid_url: String,
    pub max_graph_chars: usize,
    pub max_breakdown_chars: usize,
    pub max_timeline_chars: usize,
}

impl RenderConfig {
    pub fn max_markup_chars(&self, kind: DiagramKind) -> usize {
        match kind {
            DiagramKind::Graph => self.max_graph_chars,
            DiagramKind::Breakdown => self.max_breakdown_chars,
            DiagramKind::Timeline => self.max_timeline_chars,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            graphviz_bin: PathBuf::from("dot"),
            plantuml_url: "https://www.plantuml.com/plantuml".to_string(),
            mermaid_url: "https://mermaid.ink".to_string(),
            max_graph_chars: 50_000,
            max_breakdown_chars: 50_000,
            max_timeline_chars: 50_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_prompt_chars: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_prompt_chars: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub db_path: Option<PathBuf>,
    pub retention_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: None,
            retention_days: 30,
        }
    }
}

impl AppConfig {
    /// Defaults overlaid with the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env()?;
        Ok(cfg)
    }

    /// Overlays `DIAGRAMMER_*` variables and the provider key for the selected provider.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = env::var("DIAGRAMMER_LLM_PROVIDER") {
            self.llm.provider = ProviderKind::parse(&v)?;
        }
        if let Ok(v) = env::var("DIAGRAMMER_LLM_MODEL") {
            self.llm.model = Some(v);
        }
        if let Ok(v) = env::var("DIAGRAMMER_LLM_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        parse_env("DIAGRAMMER_MAX_TOKENS", &mut self.llm.max_tokens)?;
        parse_env("DIAGRAMMER_LLM_TIMEOUT_MS", &mut self.llm.request_timeout_ms)?;
        parse_env("DIAGRAMMER_RETRY_MAX_ATTEMPTS", &mut self.retry.max_attempts)?;
        parse_env("DIAGRAMMER_RETRY_BACKOFF_MS", &mut self.retry.initial_backoff_ms)?;
        parse_env("DIAGRAMMER_RENDER_TIMEOUT_MS", &mut self.render.timeout_ms)?;
        parse_env("DIAGRAMMER_MAX_PROMPT_CHARS", &mut self.limits.max_prompt_chars)?;
        parse_env("DIAGRAMMER_CACHE_ENABLED", &mut self.cache.enabled)?;
        parse_env("DIAGRAMMER_RETENTION_DAYS", &mut self.cache.retention_days)?;
        if let Ok(v) = env::var("DIAGRAMMER_GRAPHVIZ_BIN") {
            self.render.graphviz_bin = PathBuf::from(v);
        }
        if let Ok(v) = env::var("DIAGRAMMER_PLANTUML_URL") {
            self.render.plantuml_url = v;
        }
        if let Ok(v) = env::var("DIAGRAMMER_MERMAID_URL") {
            self.render.mermaid_url = v;
        }
        if let Ok(v) = env::var("DIAGRAMMER_DB") {
            self.cache.db_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = env::var("DIAGRAMMER_LOG") {
            self.log_level = v;
        }

        let key_var = match self.llm.provider {
            ProviderKind::Openai => "OPENAI_API_KEY",
            ProviderKind::Nvidia => "NVIDIA_API_KEY",
            ProviderKind::Gemini => "GOOGLE_API_KEY",
        };
        if let Ok(v) = env::var(key_var) {
            if !v.trim().is_empty() {
                self.llm.api_key = Some(v);
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != SUPPORTED_CONFIG_VERSION {
            return Err(ConfigError(format!(
                "unsupported config version {} (supported: {})",
                self.version, SUPPORTED_CONFIG_VERSION
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.multiplier < 1.0 {
            return Err(ConfigError("retry.multiplier must be >= 1.0".into()));
        }
        if self.render.timeout_ms == 0 || self.llm.request_timeout_ms == 0 {
            return Err(ConfigError("timeouts must be greater than zero".into()));
        }
        if self.limits.max_prompt_chars == 0 {
            return Err(ConfigError("limits.max_prompt_chars must be greater than zero".into()));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(var: &str, slot: &mut T) -> Result<(), ConfigError> {
    if let Ok(v) = env::var(var) {
        *slot = v
            .trim()
            .parse()
            .map_err(|_| ConfigError(format!("invalid value for {}: '{}'", var, v)))?;
    }
    Ok(())
}

/// Loads a YAML config file. Unknown keys are reported and, in strict mode, rejected.
pub fn load_config(path: &Path, strict: bool) -> Result<AppConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    parse_config(&raw, strict)
        .map_err(|e| ConfigError(format!("{} (file: {})", e.0, path.display())))
}

pub fn parse_config(raw: &str, strict: bool) -> Result<AppConfig, ConfigError> {
    let mut ignored_keys = std::collections::BTreeSet::new();
    let deserializer = serde_yaml::Deserializer::from_str(raw);

    let cfg: AppConfig = serde_ignored::deserialize(deserializer, |path| {
        ignored_keys.insert(path.to_string());
    })
    .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;

    let meaningful: Vec<_> = ignored_keys
        .iter()
        .filter(|k| !k.starts_with('_') && !k.starts_with("x-"))
        .collect();
    if !meaningful.is_empty() {
        if strict {
            return Err(ConfigError(format!(
                "Unknown fields detected in strict mode: {:?}",
                meaningful
            )));
        }
        tracing::warn!(event = "config.unknown_keys", keys = ?meaningful, "ignoring unknown config keys");
    }

    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.render.max_markup_chars(DiagramKind::Timeline), 50_000);
        assert!(!cfg.llm.has_credentials());
    }

    #[test]
    fn yaml_overrides_sections() {
        let cfg = parse_config(
            r#"
configVersion: 1
llm:
  provider: gemini
  model: gemini-1.5-pro
retry:
  max_attempts: 5
limits:
  max_prompt_chars: 500
"#,
            true,
        )
        .unwrap();
        assert_eq!(cfg.llm.provider, ProviderKind::Gemini);
        assert_eq!(cfg.llm.model_name(), "gemini-1.5-pro");
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.initial_backoff_ms, 1000);
        assert_eq!(cfg.limits.max_prompt_chars, 500);
    }

    #[test]
    fn strict_mode_rejects_unknown_keys() {
        let err = parse_config("llm:\n  provder: openai\n", true).unwrap_err();
        assert!(err.0.contains("provder"), "{}", err.0);
        assert!(parse_config("llm:\n  provder: openai\n", false).is_ok());
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let err = parse_config("configVersion: 7\n", false).unwrap_err();
        assert!(err.0.contains("unsupported config version 7"));
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let llm = LlmConfig {
            api_key: Some("sk-secret".into()),
            ..Default::default()
        };
        let shown = format!("{:?}", llm);
        assert!(!shown.contains("sk-secret"));
        assert!(shown.contains("<redacted>"));
    }
}
