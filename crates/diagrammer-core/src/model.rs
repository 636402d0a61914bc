use crate::errors::{RenderError, RenderErrorKind, RequestError, Stage};
use crate::fingerprint::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagramKind {
    /// Graphviz DOT: flowcharts, networks, class and state graphs.
    Graph,
    /// PlantUML work breakdown structure.
    Breakdown,
    /// Mermaid gantt timeline.
    Timeline,
}

impl DiagramKind {
    pub const ALL: [DiagramKind; 3] = [
        DiagramKind::Graph,
        DiagramKind::Breakdown,
        DiagramKind::Timeline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DiagramKind::Graph => "graph",
            DiagramKind::Breakdown => "breakdown",
            DiagramKind::Timeline => "timeline",
        }
    }

    pub fn parse(s: &str) -> Result<Self, RequestError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "graph" => Ok(DiagramKind::Graph),
            "breakdown" | "wbs" => Ok(DiagramKind::Breakdown),
            "timeline" | "gantt" => Ok(DiagramKind::Timeline),
            _ => Err(RequestError::UnknownDiagramKind(s.to_string())),
        }
    }
}

impl fmt::Display for DiagramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Svg,
    Png,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "png",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Svg => "image/svg+xml",
            OutputFormat::Png => "image/png",
        }
    }

    pub fn parse(s: &str) -> Result<Self, RenderError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "svg" => Ok(OutputFormat::Svg),
            "png" => Ok(OutputFormat::Png),
            other => Err(RenderError::new(
                RenderErrorKind::UnsupportedFormat,
                format!("format '{other}' is not supported (expected svg or png)"),
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Graphviz layout algorithms. Only meaningful for [`DiagramKind::Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutEngine {
    #[default]
    Dot,
    Neato,
    Fdp,
    Sfdp,
    Twopi,
    Circo,
}

impl LayoutEngine {
    pub const ALL: [LayoutEngine; 6] = [
        LayoutEngine::Dot,
        LayoutEngine::Neato,
        LayoutEngine::Fdp,
        LayoutEngine::Sfdp,
        LayoutEngine::Twopi,
        LayoutEngine::Circo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutEngine::Dot => "dot",
            LayoutEngine::Neato => "neato",
            LayoutEngine::Fdp => "fdp",
            LayoutEngine::Sfdp => "sfdp",
            LayoutEngine::Twopi => "twopi",
            LayoutEngine::Circo => "circo",
        }
    }

    pub fn parse(s: &str) -> Result<Self, RequestError> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == lowered)
            .ok_or_else(|| RequestError::UnknownLayoutEngine(s.to_string()))
    }
}

impl fmt::Display for LayoutEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelIdentity {
    pub provider: String,
    pub model: String,
}

impl ModelIdentity {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

/// A validated generation request. Fields are private so a request cannot be
/// changed after construction; the `with_*` helpers consume and rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    kind: DiagramKind,
    prompt: String,
    format: OutputFormat,
    layout: LayoutEngine,
    model: ModelIdentity,
}

impl GenerationRequest {
    pub fn new(kind: DiagramKind, prompt: impl Into<String>, model: ModelIdentity) -> Self {
        Self {
            kind,
            prompt: prompt.into(),
            format: OutputFormat::default(),
            layout: LayoutEngine::default(),
            model,
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_layout(mut self, layout: LayoutEngine) -> Self {
        self.layout = layout;
        self
    }

    pub fn kind(&self) -> DiagramKind {
        self.kind
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn layout(&self) -> LayoutEngine {
        self.layout
    }

    pub fn model(&self) -> &ModelIdentity {
        &self.model
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkupSource {
    pub provider: String,
    pub model: String,
    pub token_usage: Option<u32>,
    pub latency_ms: u64,
    pub attempts: u32,
    /// True when the markup came from the local template generator.
    #[serde(default)]
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkupArtifact {
    pub raw_markup: String,
    pub sanitized_markup: String,
    pub source: MarkupSource,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedArtifact {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub engine_used: String,
    pub render_latency_ms: u64,
}

impl fmt::Debug for RenderedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderedArtifact")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("mime_type", &self.mime_type)
            .field("engine_used", &self.engine_used)
            .field("render_latency_ms", &self.render_latency_ms)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub kind: DiagramKind,
    pub markup: MarkupArtifact,
    pub rendered: RenderedArtifact,
    pub created_at: DateTime<Utc>,
    pub hit_count: u64,
}

impl CacheEntry {
    pub fn new(
        fingerprint: Fingerprint,
        kind: DiagramKind,
        markup: MarkupArtifact,
        rendered: RenderedArtifact,
    ) -> Self {
        Self {
            fingerprint,
            kind,
            markup,
            rendered,
            created_at: Utc::now(),
            hit_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    CacheHit,
    Generated,
    Failed,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::CacheHit => "cache_hit",
            AuditOutcome::Generated => "generated",
            AuditOutcome::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "cache_hit" => AuditOutcome::CacheHit,
            "generated" => AuditOutcome::Generated,
            _ => AuditOutcome::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyBreakdown {
    pub cache_ms: u64,
    pub generation_ms: u64,
    pub render_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub fingerprint: Fingerprint,
    pub kind: DiagramKind,
    pub outcome: AuditOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub coalesced: bool,
    pub provider: String,
    pub model: String,
    pub token_usage: Option<u32>,
    pub latency: LatencyBreakdown,
    pub created_at: DateTime<Utc>,
}

/// Aggregates over the audit log, for the analytics collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageStats {
    pub total_requests: u64,
    pub generated: u64,
    pub cache_hits: u64,
    pub failed: u64,
    pub total_tokens: u64,
    pub avg_generation_ms: Option<f64>,
}

impl UsageStats {
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_requests == 0 {
            return None;
        }
        Some((self.generated + self.cache_hits) as f64 / self.total_requests as f64)
    }

    pub fn cache_hit_rate(&self) -> Option<f64> {
        if self.total_requests == 0 {
            return None;
        }
        Some(self.cache_hits as f64 / self.total_requests as f64)
    }
}
