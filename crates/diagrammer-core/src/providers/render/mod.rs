use crate::config::RenderConfig;
use crate::errors::truncate_detail;
use crate::model::{LayoutEngine, OutputFormat};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub mod fake;
pub mod graphviz;
pub mod mermaid;
pub mod plantuml;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("engine rejected markup: {0}")]
    BadInput(String),
    #[error("engine unavailable: {0}")]
    EngineMissing(String),
    #[error("engine timed out after {0}ms")]
    TimedOut(u64),
}

impl BackendError {
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = format!("HTTP {}: {}", status, truncate_detail(body));
        match status {
            400 => BackendError::BadInput(detail),
            _ => BackendError::EngineMissing(detail),
        }
    }

    pub fn from_transport(e: &reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            BackendError::TimedOut(timeout.as_millis() as u64)
        } else {
            BackendError::EngineMissing(truncate_detail(&e.to_string()))
        }
    }
}

/// One rendering engine. `engine` is a layout hint that only graph backends use.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    async fn render(
        &self,
        markup: &str,
        format: OutputFormat,
        engine: LayoutEngine,
    ) -> Result<Vec<u8>, BackendError>;

    fn name(&self) -> &'static str;
}

/// Fetches a rendered image from a web renderer.
pub(crate) async fn fetch_image(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<u8>, BackendError> {
    let resp = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| BackendError::from_transport(&e, timeout))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(BackendError::from_status(status.as_u16(), &body));
    }

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| BackendError::from_transport(&e, timeout))?;
    Ok(bytes.to_vec())
}

/// The three stock backends for a config.
pub fn default_backends(
    cfg: &RenderConfig,
) -> (graphviz::GraphvizBackend, plantuml::PlantUmlBackend, mermaid::MermaidInkBackend) {
    let http_timeout = Duration::from_millis(cfg.timeout_ms);
    (
        graphviz::GraphvizBackend::new(cfg.graphviz_bin.clone()),
        plantuml::PlantUmlBackend::new(cfg.plantuml_url.clone(), http_timeout),
        mermaid::MermaidInkBackend::new(cfg.mermaid_url.clone(), http_timeout),
    )
}
