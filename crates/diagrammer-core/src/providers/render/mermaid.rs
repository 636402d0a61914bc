use super::{fetch_image, BackendError, RenderBackend};
use crate::model::{LayoutEngine, OutputFormat};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use std::time::Duration;

/// Renders Mermaid timelines through a mermaid.ink compatible service.
pub struct MermaidInkBackend {
    pub base_url: String,
    pub timeout: Duration,
    pub client: reqwest::Client,
}

impl MermaidInkBackend {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            base_url,
            timeout,
            client: reqwest::Client::new(),
        }
    }

    pub fn url_for(&self, markup: &str, format: OutputFormat) -> String {
        // mermaid.ink serves SVG under /svg and raster images under /img.
        let segment = match format {
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "img",
        };
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            segment,
            URL_SAFE.encode(markup.as_bytes())
        )
    }
}

#[async_trait]
impl RenderBackend for MermaidInkBackend {
    async fn render(
        &self,
        markup: &str,
        format: OutputFormat,
        _engine: LayoutEngine,
    ) -> Result<Vec<u8>, BackendError> {
        let url = self.url_for(markup, format);
        tracing::debug!(event = "render.mermaid.request", base = %self.base_url, url_len = url.len());
        fetch_image(&self.client, &url, self.timeout).await
    }

    fn name(&self) -> &'static str {
        "mermaid"
    }
}
