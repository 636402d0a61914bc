use crate::config::RenderConfig;
use crate::errors::{RenderError, RenderErrorKind};
use crate::model::{DiagramKind, LayoutEngine, OutputFormat, RenderedArtifact};
use crate::providers::render::{default_backends, BackendError, RenderBackend};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Validates markup and drives the backend for its diagram kind under a hard deadline.
#[derive(Clone)]
pub struct Renderer {
    cfg: RenderConfig,
    graph: Arc<dyn RenderBackend>,
    breakdown: Arc<dyn RenderBackend>,
    timeline: Arc<dyn RenderBackend>,
}

impl Renderer {
    /// Graphviz subprocess, PlantUML server and mermaid.ink, as configured.
    pub fn new(cfg: &RenderConfig) -> Self {
        let (graphviz, plantuml, mermaid) = default_backends(cfg);
        Self::with_backends(
            cfg,
            Arc::new(graphviz),
            Arc::new(plantuml),
            Arc::new(mermaid),
        )
    }

    pub fn with_backends(
        cfg: &RenderConfig,
        graph: Arc<dyn RenderBackend>,
        breakdown: Arc<dyn RenderBackend>,
        timeline: Arc<dyn RenderBackend>,
    ) -> Self {
        Self {
            cfg: cfg.clone(),
            graph,
            breakdown,
            timeline,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.cfg.timeout_ms)
    }

    fn backend(&self, kind: DiagramKind) -> &Arc<dyn RenderBackend> {
        match kind {
            DiagramKind::Graph => &self.graph,
            DiagramKind::Breakdown => &self.breakdown,
            DiagramKind::Timeline => &self.timeline,
        }
    }

    /// Cheap grammar checks that run before any engine is touched.
    pub fn validate(&self, markup: &str, kind: DiagramKind) -> Result<(), RenderError> {
        let max = self.cfg.max_markup_chars(kind);
        let len = markup.chars().count();
        if len > max {
            return Err(RenderError::invalid(format!(
                "{} markup too large: {} chars > max {}",
                kind, len, max
            )));
        }

        let body = markup.trim();
        if body.is_empty() {
            return Err(RenderError::invalid("markup is empty"));
        }

        match kind {
            DiagramKind::Graph => validate_dot(body),
            DiagramKind::Breakdown => validate_wbs(body),
            DiagramKind::Timeline => validate_gantt(body),
        }
    }

    pub async fn render(
        &self,
        markup: &str,
        kind: DiagramKind,
        format: OutputFormat,
        engine: LayoutEngine,
    ) -> Result<RenderedArtifact, RenderError> {
        self.validate(markup, kind)?;

        let backend = self.backend(kind);
        let timeout = self.timeout();
        let start = Instant::now();

        let result = tokio::time::timeout(timeout, backend.render(markup, format, engine)).await;
        let render_latency_ms = start.elapsed().as_millis() as u64;

        let bytes = match result {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                tracing::warn!(
                    event = "render.backend_error",
                    backend = backend.name(),
                    kind = kind.as_str(),
                    error = %e
                );
                return Err(map_backend_error(e));
            }
            Err(_) => {
                tracing::warn!(
                    event = "render.timeout",
                    backend = backend.name(),
                    kind = kind.as_str(),
                    timeout_ms = self.cfg.timeout_ms
                );
                return Err(RenderError::new(
                    RenderErrorKind::Timeout,
                    format!("{} did not finish within {}ms", backend.name(), self.cfg.timeout_ms),
                ));
            }
        };

        let engine_used = match kind {
            DiagramKind::Graph => engine.as_str().to_string(),
            _ => backend.name().to_string(),
        };

        tracing::debug!(
            event = "render.done",
            engine = %engine_used,
            format = format.as_str(),
            bytes = bytes.len(),
            latency_ms = render_latency_ms
        );

        Ok(RenderedArtifact {
            bytes,
            mime_type: format.mime_type().to_string(),
            engine_used,
            render_latency_ms,
        })
    }
}

fn map_backend_error(e: BackendError) -> RenderError {
    match e {
        BackendError::BadInput(msg) => RenderError::new(RenderErrorKind::InvalidMarkup, msg),
        BackendError::EngineMissing(msg) => {
            RenderError::new(RenderErrorKind::EngineUnavailable, msg)
        }
        BackendError::TimedOut(ms) => RenderError::new(
            RenderErrorKind::Timeout,
            format!("engine timed out after {}ms", ms),
        ),
    }
}

fn validate_dot(body: &str) -> Result<(), RenderError> {
    let head: Vec<String> = body
        .split_whitespace()
        .take(2)
        .map(|w| w.to_ascii_lowercase())
        .collect();
    let opener = match head.first().map(String::as_str) {
        Some("strict") => head.get(1).map(String::as_str),
        other => other,
    };
    let opener = opener.map(|w| w.split('{').next().unwrap_or(w));
    if !matches!(opener, Some("graph") | Some("digraph")) {
        return Err(RenderError::invalid(
            "DOT markup must start with 'graph' or 'digraph'",
        ));
    }

    let (open, close) = brace_counts(body);
    if open == 0 || open != close {
        return Err(RenderError::invalid(format!(
            "DOT markup has unbalanced braces ({} '{{' vs {} '}}')",
            open, close
        )));
    }
    Ok(())
}

/// Counts `{` and `}` outside double-quoted strings.
fn brace_counts(body: &str) -> (usize, usize) {
    let (mut open, mut close) = (0, 0);
    let mut in_string = false;
    let mut escaped = false;
    for c in body.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => open += 1,
            '}' => close += 1,
            _ => {}
        }
    }
    (open, close)
}

fn validate_wbs(body: &str) -> Result<(), RenderError> {
    let starts = body.starts_with("@startwbs") || body.starts_with("@startuml");
    let ends = body.ends_with("@endwbs") || body.ends_with("@enduml");
    if !starts || !ends {
        return Err(RenderError::invalid(
            "breakdown markup must be wrapped in @startwbs ... @endwbs",
        ));
    }
    Ok(())
}

fn validate_gantt(body: &str) -> Result<(), RenderError> {
    if !body.split_whitespace().any(|w| w == "gantt") {
        return Err(RenderError::invalid("timeline markup must declare 'gantt'"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::render::fake::FakeBackend;
    use crate::templates::{BREAKDOWN_WBS, FLOWCHART_DOT, TIMELINE_GANTT};

    fn renderer_with(graph: FakeBackend) -> Renderer {
        Renderer::with_backends(
            &RenderConfig::default(),
            Arc::new(graph),
            Arc::new(FakeBackend::new("plantuml")),
            Arc::new(FakeBackend::new("mermaid")),
        )
    }

    #[test]
    fn templates_pass_validation() {
        let r = renderer_with(FakeBackend::new("graphviz"));
        r.validate(FLOWCHART_DOT, DiagramKind::Graph).unwrap();
        r.validate(BREAKDOWN_WBS, DiagramKind::Breakdown).unwrap();
        r.validate(TIMELINE_GANTT, DiagramKind::Timeline).unwrap();
        r.validate("strict digraph{a->b}", DiagramKind::Graph).unwrap();
    }

    #[test]
    fn rejects_malformed_markup() {
        let r = renderer_with(FakeBackend::new("graphviz"));
        for (markup, kind) in [
            ("   \n ", DiagramKind::Graph),
            ("flowchart { a -> b }", DiagramKind::Graph),
            ("digraph g { a -> b", DiagramKind::Graph),
            ("* Root\n** Child", DiagramKind::Breakdown),
            ("title Plan\nsection A", DiagramKind::Timeline),
        ] {
            let err = r.validate(markup, kind).unwrap_err();
            assert_eq!(err.kind, RenderErrorKind::InvalidMarkup, "{markup:?}");
        }
    }

    #[test]
    fn braces_inside_quoted_labels_are_ignored() {
        let r = renderer_with(FakeBackend::new("graphviz"));
        let dot = r#"digraph g { a [label="}"]; b [label="say \"{\""]; a -> b }"#;
        r.validate(dot, DiagramKind::Graph).unwrap();

        let err = r
            .validate(r#"digraph g { a [label="{"]"#, DiagramKind::Graph)
            .unwrap_err();
        assert_eq!(err.kind, RenderErrorKind::InvalidMarkup);
    }

    #[test]
    fn rejects_oversized_markup() {
        let cfg = RenderConfig {
            max_graph_chars: 10,
            ..RenderConfig::default()
        };
        let r = Renderer::with_backends(
            &cfg,
            Arc::new(FakeBackend::new("graphviz")),
            Arc::new(FakeBackend::new("plantuml")),
            Arc::new(FakeBackend::new("mermaid")),
        );
        let err = r.validate(FLOWCHART_DOT, DiagramKind::Graph).unwrap_err();
        assert!(err.message.contains("too large"));
    }

    #[tokio::test]
    async fn engine_used_follows_kind() {
        let r = renderer_with(FakeBackend::new("graphviz"));
        let out = r
            .render(FLOWCHART_DOT, DiagramKind::Graph, OutputFormat::Svg, LayoutEngine::Neato)
            .await
            .unwrap();
        assert_eq!(out.engine_used, "neato");
        assert_eq!(out.mime_type, "image/svg+xml");

        let out = r
            .render(BREAKDOWN_WBS, DiagramKind::Breakdown, OutputFormat::Png, LayoutEngine::Circo)
            .await
            .unwrap();
        assert_eq!(out.engine_used, "plantuml");
        assert_eq!(out.mime_type, "image/png");
        assert!(out.bytes.starts_with(b"\x89PNG"));
    }

    #[tokio::test]
    async fn invalid_markup_never_reaches_backend() {
        let graph = Arc::new(FakeBackend::new("graphviz"));
        let r = Renderer::with_backends(
            &RenderConfig::default(),
            graph.clone(),
            Arc::new(FakeBackend::new("plantuml")),
            Arc::new(FakeBackend::new("mermaid")),
        );
        let err = r
            .render("not dot", DiagramKind::Graph, OutputFormat::Svg, LayoutEngine::Dot)
            .await
            .unwrap_err();
        assert_eq!(err.kind, RenderErrorKind::InvalidMarkup);
        assert_eq!(graph.calls(), 0);
    }

    #[tokio::test]
    async fn backend_errors_map_to_render_kinds() {
        let r = renderer_with(FakeBackend::failing(
            "graphviz",
            BackendError::EngineMissing("dot not installed".into()),
        ));
        let err = r
            .render(FLOWCHART_DOT, DiagramKind::Graph, OutputFormat::Svg, LayoutEngine::Dot)
            .await
            .unwrap_err();
        assert_eq!(err.kind, RenderErrorKind::EngineUnavailable);

        let r = renderer_with(FakeBackend::failing(
            "graphviz",
            BackendError::BadInput("syntax error in line 2".into()),
        ));
        let err = r
            .render(FLOWCHART_DOT, DiagramKind::Graph, OutputFormat::Svg, LayoutEngine::Dot)
            .await
            .unwrap_err();
        assert_eq!(err.kind, RenderErrorKind::InvalidMarkup);
    }
}
