use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Which part of the pipeline a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Request,
    Generation,
    Rendering,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Request => "request",
            Stage::Generation => "generation",
            Stage::Rendering => "rendering",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "request" => Some(Stage::Request),
            "generation" => Some(Stage::Generation),
            "rendering" => Some(Stage::Rendering),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationErrorKind {
    ProviderUnavailable,
    ProviderRejected,
    Timeout,
    EmptyResponse,
}

impl GenerationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationErrorKind::ProviderUnavailable => "provider_unavailable",
            GenerationErrorKind::ProviderRejected => "provider_rejected",
            GenerationErrorKind::Timeout => "timeout",
            GenerationErrorKind::EmptyResponse => "empty_response",
        }
    }
}

/// Terminal failure of the markup generator, after its own retries.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{} after {attempts} attempt(s): {message}", kind.as_str())]
pub struct GenerationError {
    pub kind: GenerationErrorKind,
    pub message: String,
    pub attempts: u32,
}

impl GenerationError {
    pub fn new(kind: GenerationErrorKind, message: impl Into<String>, attempts: u32) -> Self {
        Self {
            kind,
            message: message.into(),
            attempts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderErrorKind {
    InvalidMarkup,
    EngineUnavailable,
    Timeout,
    UnsupportedFormat,
}

impl RenderErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderErrorKind::InvalidMarkup => "invalid_markup",
            RenderErrorKind::EngineUnavailable => "engine_unavailable",
            RenderErrorKind::Timeout => "render_timeout",
            RenderErrorKind::UnsupportedFormat => "unsupported_format",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}: {message}", kind.as_str())]
pub struct RenderError {
    pub kind: RenderErrorKind,
    pub message: String,
}

impl RenderError {
    pub fn new(kind: RenderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(RenderErrorKind::InvalidMarkup, message)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    StoreUnavailable(String),
}

impl CacheError {
    pub fn unavailable(e: impl fmt::Display) -> Self {
        CacheError::StoreUnavailable(e.to_string())
    }
}

/// Rejections raised before any provider or engine is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("prompt too large: {len} chars > max {max}")]
    InputTooLarge { len: usize, max: usize },
    #[error("unknown layout engine '{0}' (expected one of dot, neato, fdp, sfdp, twopi, circo)")]
    UnknownLayoutEngine(String),
    #[error("unknown diagram kind '{0}' (expected graph, breakdown or timeline)")]
    UnknownDiagramKind(String),
}

impl RequestError {
    pub fn kind_str(&self) -> &'static str {
        match self {
            RequestError::EmptyPrompt => "empty_prompt",
            RequestError::InputTooLarge { .. } => "input_too_large",
            RequestError::UnknownLayoutEngine(_) => "unknown_layout_engine",
            RequestError::UnknownDiagramKind(_) => "unknown_diagram_kind",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConfigError(pub String);

/// What a caller of the orchestrator (or a coalesced cache waiter) sees on failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("request rejected: {0}")]
    Request(#[from] RequestError),
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("rendering failed: {0}")]
    Render(#[from] RenderError),
    #[error("generation task ended without a result")]
    Aborted,
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Request(_) => Stage::Request,
            PipelineError::Generation(_) | PipelineError::Aborted => Stage::Generation,
            PipelineError::Render(_) => Stage::Rendering,
        }
    }

    pub fn error_kind(&self) -> &'static str {
        match self {
            PipelineError::Request(e) => e.kind_str(),
            PipelineError::Generation(e) => e.kind.as_str(),
            PipelineError::Render(e) => e.kind.as_str(),
            PipelineError::Aborted => "aborted",
        }
    }

    /// Structured body for callers: stage + kind + message, nothing provider-specific.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "stage": self.stage(),
            "kind": self.error_kind(),
            "message": self.to_string(),
        })
    }
}

/// Keeps provider/engine payloads out of user-facing messages.
pub(crate) fn truncate_detail(s: &str) -> String {
    const MAX: usize = 200;
    let s = s.trim();
    match s.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
