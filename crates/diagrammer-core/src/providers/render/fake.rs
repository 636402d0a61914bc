use super::{BackendError, RenderBackend};
use crate::model::{LayoutEngine, OutputFormat};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// In-process backend for tests: echoes a tiny document or fails on demand.
pub struct FakeBackend {
    name: &'static str,
    failure: Option<BackendError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            failure: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &'static str, err: BackendError) -> Self {
        Self {
            failure: Some(err),
            ..Self::new(name)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderBackend for FakeBackend {
    async fn render(
        &self,
        markup: &str,
        format: OutputFormat,
        engine: LayoutEngine,
    ) -> Result<Vec<u8>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        let body = match format {
            OutputFormat::Svg => format!(
                "<svg xmlns=\"http://www.w3.org/2000/svg\" data-engine=\"{}\"><!-- {} bytes --></svg>",
                engine.as_str(),
                markup.len()
            )
            .into_bytes(),
            OutputFormat::Png => {
                let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
                png.extend_from_slice(&(markup.len() as u32).to_be_bytes());
                png
            }
        };
        Ok(body)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
