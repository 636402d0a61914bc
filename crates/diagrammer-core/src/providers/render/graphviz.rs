use super::{BackendError, RenderBackend};
use crate::errors::truncate_detail;
use crate::model::{LayoutEngine, OutputFormat};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Renders DOT by piping it through the Graphviz `dot` binary.
pub struct GraphvizBackend {
    pub binary: PathBuf,
}

impl GraphvizBackend {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }
}

#[async_trait]
impl RenderBackend for GraphvizBackend {
    async fn render(
        &self,
        markup: &str,
        format: OutputFormat,
        engine: LayoutEngine,
    ) -> Result<Vec<u8>, BackendError> {
        let mut child = Command::new(&self.binary)
            .arg(format!("-K{}", engine.as_str()))
            .arg(format!("-T{}", format.as_str()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // The caller's timeout drops this future; the child must not outlive it.
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    BackendError::EngineMissing(format!(
                        "graphviz executable '{}' not found; install Graphviz (https://graphviz.org/download/)",
                        self.binary.display()
                    ))
                } else {
                    BackendError::EngineMissing(format!("failed to start graphviz: {e}"))
                }
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| BackendError::EngineMissing("graphviz stdin unavailable".into()))?;
        let input = markup.as_bytes().to_vec();
        let writer = tokio::spawn(async move {
            let res = stdin.write_all(&input).await;
            drop(stdin);
            res
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| BackendError::EngineMissing(format!("graphviz did not finish: {e}")))?;
        // A write error here means dot exited early; its exit status says why.
        let _ = writer.await;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::BadInput(truncate_detail(&stderr)));
        }
        if output.stdout.is_empty() {
            return Err(BackendError::BadInput("graphviz produced no output".into()));
        }

        tracing::debug!(
            event = "render.graphviz.done",
            engine = engine.as_str(),
            format = format.as_str(),
            bytes = output.stdout.len()
        );
        Ok(output.stdout)
    }

    fn name(&self) -> &'static str {
        "graphviz"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_engine_missing() {
        let backend = GraphvizBackend::new(PathBuf::from("/nonexistent/bin/dot-xyz"));
        let err = backend
            .render("digraph g { a -> b }", OutputFormat::Svg, LayoutEngine::Dot)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::EngineMissing(_)), "{err:?}");
    }
}
