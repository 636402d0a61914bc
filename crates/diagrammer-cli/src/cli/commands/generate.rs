use super::{default_out, exit_codes, open_store, parse_target, write_artifact};
use crate::cli::args::GenerateArgs;
use diagrammer_core::config::AppConfig;
use diagrammer_core::Orchestrator;
use std::path::Path;
use std::sync::Arc;

pub async fn run(args: GenerateArgs, cfg: &AppConfig, db: &Path) -> anyhow::Result<i32> {
    let (kind, format, layout) = match parse_target(&args.kind, &args.format, &args.layout) {
        Ok(t) => t,
        Err(msg) => {
            eprintln!("config error: {msg}");
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let store = Arc::new(open_store(db)?);
    let orch = Orchestrator::from_config(cfg, store.clone(), store)
        .with_caching(cfg.cache.enabled && !args.no_cache);

    if orch.generator().is_fallback() {
        eprintln!(
            "note: no API key for provider '{}'; using built-in templates",
            cfg.llm.provider.as_str()
        );
    }

    let req = orch
        .request(kind, args.prompt)
        .with_format(format)
        .with_layout(layout);

    let outcome = match orch.generate(&req).await {
        Ok(o) => o,
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&e.to_json())?);
            return Ok(exit_codes::FAILED);
        }
    };

    let out = args.out.unwrap_or_else(|| default_out(format));
    write_artifact(&out, &outcome.rendered.bytes)?;

    let markup_path = if args.emit_markup {
        let p = out.with_extension(markup_extension(kind));
        write_artifact(&p, outcome.markup.sanitized_markup.as_bytes())?;
        Some(p)
    } else {
        None
    };

    let summary = serde_json::json!({
        "fingerprint": outcome.fingerprint,
        "outcome": outcome.outcome,
        "coalesced": outcome.coalesced,
        "kind": kind,
        "mime_type": outcome.rendered.mime_type,
        "engine": outcome.rendered.engine_used,
        "bytes": outcome.rendered.bytes.len(),
        "out": out.display().to_string(),
        "markup": markup_path.map(|p| p.display().to_string()),
        "provider": outcome.markup.source.provider,
        "model": outcome.markup.source.model,
        "fallback": outcome.markup.source.fallback,
        "token_usage": outcome.markup.source.token_usage,
        "latency": outcome.latency,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(exit_codes::OK)
}

fn markup_extension(kind: diagrammer_core::model::DiagramKind) -> &'static str {
    use diagrammer_core::model::DiagramKind;
    match kind {
        DiagramKind::Graph => "dot",
        DiagramKind::Breakdown => "puml",
        DiagramKind::Timeline => "mmd",
    }
}
