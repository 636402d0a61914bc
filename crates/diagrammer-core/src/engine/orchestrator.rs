use crate::cache::{Flight, GenerationCache, Origin, Resolution};
use crate::config::{AppConfig, LimitsConfig};
use crate::errors::{PipelineError, RenderError, RequestError};
use crate::fingerprint::{self, Fingerprint};
use crate::generator::MarkupGenerator;
use crate::model::{
    AuditOutcome, AuditRecord, CacheEntry, DiagramKind, GenerationRequest, LatencyBreakdown,
    LayoutEngine, MarkupArtifact, OutputFormat, RenderedArtifact,
};
use crate::render::Renderer;
use crate::storage::{AuditSink, GenerationStore};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Lifecycle of one request through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    CacheCheck,
    HitDone,
    MissGenerating,
    MissRendering,
    MissStoring,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Init => "init",
            PipelineState::CacheCheck => "cache_check",
            PipelineState::HitDone => "hit_done",
            PipelineState::MissGenerating => "miss_generating",
            PipelineState::MissRendering => "miss_rendering",
            PipelineState::MissStoring => "miss_storing",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn transition(fp: &Fingerprint, from: PipelineState, to: PipelineState) -> PipelineState {
    tracing::debug!(
        event = "pipeline.transition",
        fingerprint = fp.short(),
        from = from.as_str(),
        to = to.as_str()
    );
    to
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub fingerprint: Fingerprint,
    pub outcome: AuditOutcome,
    pub markup: MarkupArtifact,
    pub rendered: RenderedArtifact,
    pub coalesced: bool,
    pub latency: LatencyBreakdown,
}

/// Runs requests through fingerprint, cache, generator and renderer, and
/// writes one audit record per request.
#[derive(Clone)]
pub struct Orchestrator {
    generator: Arc<MarkupGenerator>,
    renderer: Arc<Renderer>,
    cache: GenerationCache,
    caching: bool,
    audit: Arc<dyn AuditSink>,
    limits: LimitsConfig,
}

impl Orchestrator {
    pub fn new(
        generator: MarkupGenerator,
        renderer: Renderer,
        store: Arc<dyn GenerationStore>,
        audit: Arc<dyn AuditSink>,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            generator: Arc::new(generator),
            renderer: Arc::new(renderer),
            cache: GenerationCache::new(store),
            caching: true,
            audit,
            limits,
        }
    }

    /// Stock generator and renderer for `cfg`.
    pub fn from_config(
        cfg: &AppConfig,
        store: Arc<dyn GenerationStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self::new(
            MarkupGenerator::from_config(cfg),
            Renderer::new(&cfg.render),
            store,
            audit,
            cfg.limits.clone(),
        )
        .with_caching(cfg.cache.enabled)
    }

    /// With caching off every request generates and nothing is stored.
    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.caching = enabled;
        self
    }

    pub fn cache(&self) -> &GenerationCache {
        &self.cache
    }

    pub fn generator(&self) -> &MarkupGenerator {
        &self.generator
    }

    /// A request stamped with this orchestrator's model identity.
    pub fn request(&self, kind: DiagramKind, prompt: impl Into<String>) -> GenerationRequest {
        GenerationRequest::new(kind, prompt, self.generator.identity())
    }

    /// Renders caller-supplied markup. No LLM call, nothing cached or audited.
    pub async fn preview(
        &self,
        markup: &str,
        kind: DiagramKind,
        format: OutputFormat,
        engine: LayoutEngine,
    ) -> Result<RenderedArtifact, RenderError> {
        tracing::info!(event = "pipeline.preview", kind = kind.as_str(), format = format.as_str());
        self.renderer.render(markup, kind, format, engine).await
    }

    fn check_prompt(&self, prompt: &str) -> Result<(), RequestError> {
        if prompt.trim().is_empty() {
            return Err(RequestError::EmptyPrompt);
        }
        let len = prompt.chars().count();
        let max = self.limits.max_prompt_chars;
        if len > max {
            return Err(RequestError::InputTooLarge { len, max });
        }
        Ok(())
    }

    pub async fn generate(&self, req: &GenerationRequest) -> Result<Outcome, PipelineError> {
        let start = Instant::now();
        let fp = fingerprint::compute(req);
        let state = PipelineState::Init;

        if let Err(e) = self.check_prompt(req.prompt()) {
            transition(&fp, state, PipelineState::Failed);
            let err = PipelineError::from(e);
            self.record_failure(req, &fp, &err, false, start).await;
            return Err(err);
        }

        let state = transition(&fp, state, PipelineState::CacheCheck);

        let task = PipelineTask {
            generator: self.generator.clone(),
            renderer: self.renderer.clone(),
            request: req.clone(),
            fingerprint: fp.clone(),
            store: self.caching,
        };
        let flight = if self.caching {
            self.cache.resolve(&fp, move || task.run()).await
        } else {
            Flight {
                coalesced: false,
                result: task.run().await.map(|entry| Resolution {
                    entry: Arc::new(entry),
                    origin: Origin::Generated,
                }),
            }
        };

        let resolution = match flight.result {
            Ok(r) => r,
            Err(err) => {
                transition(&fp, state, PipelineState::Failed);
                self.record_failure(req, &fp, &err, flight.coalesced, start).await;
                return Err(err);
            }
        };

        let total_ms = start.elapsed().as_millis() as u64;
        let entry = resolution.entry;
        let (outcome, coalesced, latency) = match resolution.origin {
            Origin::Generated => {
                let generation_ms = entry.markup.source.latency_ms;
                let render_ms = entry.rendered.render_latency_ms;
                (
                    AuditOutcome::Generated,
                    false,
                    LatencyBreakdown {
                        cache_ms: total_ms.saturating_sub(generation_ms + render_ms),
                        generation_ms,
                        render_ms,
                        total_ms,
                    },
                )
            }
            Origin::Cached | Origin::Coalesced => {
                transition(&fp, state, PipelineState::HitDone);
                (
                    AuditOutcome::CacheHit,
                    resolution.origin == Origin::Coalesced,
                    LatencyBreakdown {
                        cache_ms: total_ms,
                        total_ms,
                        ..LatencyBreakdown::default()
                    },
                )
            }
        };

        tracing::info!(
            event = "pipeline.done",
            fingerprint = fp.short(),
            kind = req.kind().as_str(),
            outcome = outcome.as_str(),
            coalesced,
            total_ms
        );

        let record = AuditRecord {
            fingerprint: fp.clone(),
            kind: req.kind(),
            outcome,
            stage: None,
            error_kind: None,
            coalesced,
            provider: entry.markup.source.provider.clone(),
            model: entry.markup.source.model.clone(),
            token_usage: match outcome {
                AuditOutcome::Generated => entry.markup.source.token_usage,
                _ => None,
            },
            latency,
            created_at: Utc::now(),
        };
        self.append_audit(&record).await;

        Ok(Outcome {
            fingerprint: fp,
            outcome,
            markup: entry.markup.clone(),
            rendered: entry.rendered.clone(),
            coalesced,
            latency,
        })
    }

    async fn record_failure(
        &self,
        req: &GenerationRequest,
        fp: &Fingerprint,
        err: &PipelineError,
        coalesced: bool,
        start: Instant,
    ) {
        tracing::warn!(
            event = "pipeline.failed",
            fingerprint = fp.short(),
            kind = req.kind().as_str(),
            stage = err.stage().as_str(),
            error_kind = err.error_kind(),
            error = %err
        );
        let total_ms = start.elapsed().as_millis() as u64;
        let record = AuditRecord {
            fingerprint: fp.clone(),
            kind: req.kind(),
            outcome: AuditOutcome::Failed,
            stage: Some(err.stage()),
            error_kind: Some(err.error_kind().to_string()),
            coalesced,
            provider: req.model().provider.clone(),
            model: req.model().model.clone(),
            token_usage: None,
            latency: LatencyBreakdown {
                total_ms,
                ..LatencyBreakdown::default()
            },
            created_at: Utc::now(),
        };
        self.append_audit(&record).await;
    }

    async fn append_audit(&self, record: &AuditRecord) {
        if let Err(e) = self.audit.append(record).await {
            tracing::warn!(
                event = "audit.append_failed",
                fingerprint = record.fingerprint.short(),
                error = %e
            );
        }
    }
}

/// The miss path, owned so it can run detached from the caller.
struct PipelineTask {
    generator: Arc<MarkupGenerator>,
    renderer: Arc<Renderer>,
    request: GenerationRequest,
    fingerprint: Fingerprint,
    store: bool,
}

impl PipelineTask {
    async fn run(self) -> Result<CacheEntry, PipelineError> {
        let fp = &self.fingerprint;
        let req = &self.request;

        let state = transition(fp, PipelineState::CacheCheck, PipelineState::MissGenerating);
        let markup = self
            .generator
            .generate(req.prompt(), req.kind())
            .await
            .map_err(|e| {
                transition(fp, state, PipelineState::Failed);
                PipelineError::from(e)
            })?;

        let state = transition(fp, state, PipelineState::MissRendering);
        let rendered = self
            .renderer
            .render(&markup.sanitized_markup, req.kind(), req.format(), req.layout())
            .await
            .map_err(|e| {
                transition(fp, state, PipelineState::Failed);
                PipelineError::from(e)
            })?;

        let state = if self.store {
            transition(fp, state, PipelineState::MissStoring)
        } else {
            state
        };
        transition(fp, state, PipelineState::Done);

        Ok(CacheEntry::new(fp.clone(), req.kind(), markup, rendered))
    }
}
