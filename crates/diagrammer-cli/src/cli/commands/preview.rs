use super::{default_out, exit_codes, parse_target, write_artifact};
use crate::cli::args::PreviewArgs;
use anyhow::Context;
use diagrammer_core::config::AppConfig;
use diagrammer_core::errors::PipelineError;
use diagrammer_core::storage::MemoryStore;
use diagrammer_core::Orchestrator;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

pub async fn run(args: PreviewArgs, cfg: &AppConfig) -> anyhow::Result<i32> {
    let (kind, format, layout) = match parse_target(&args.kind, &args.format, &args.layout) {
        Ok(t) => t,
        Err(msg) => {
            eprintln!("config error: {msg}");
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let markup = if args.input.as_os_str() == "-" {
        let mut buf = String::new();
        tokio::io::stdin().read_to_string(&mut buf).await?;
        buf
    } else {
        tokio::fs::read_to_string(&args.input)
            .await
            .with_context(|| format!("failed to read {}", args.input.display()))?
    };

    // Preview never touches the cache or the audit log.
    let scratch = Arc::new(MemoryStore::new());
    let orch = Orchestrator::from_config(cfg, scratch.clone(), scratch);

    let rendered = match orch.preview(&markup, kind, format, layout).await {
        Ok(r) => r,
        Err(e) => {
            let e = PipelineError::from(e);
            println!("{}", serde_json::to_string_pretty(&e.to_json())?);
            return Ok(exit_codes::FAILED);
        }
    };

    let out = args.out.unwrap_or_else(|| default_out(format));
    write_artifact(&out, &rendered.bytes)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "kind": kind,
            "mime_type": rendered.mime_type,
            "engine": rendered.engine_used,
            "bytes": rendered.bytes.len(),
            "render_latency_ms": rendered.render_latency_ms,
            "out": out.display().to_string(),
        }))?
    );
    Ok(exit_codes::OK)
}
