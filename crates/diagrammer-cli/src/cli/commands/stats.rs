use super::{exit_codes, open_store};
use crate::cli::args::{HistoryArgs, StatsArgs};
use std::path::Path;

pub fn cmd_stats(args: StatsArgs, db: &Path) -> anyhow::Result<i32> {
    let store = open_store(db)?;
    let stats = store.usage_stats()?;
    let entries = store.entry_count()?;

    if args.format == "json" {
        let mut v = serde_json::to_value(&stats)?;
        v["cached_diagrams"] = entries.into();
        v["success_rate"] = serde_json::json!(stats.success_rate());
        v["cache_hit_rate"] = serde_json::json!(stats.cache_hit_rate());
        println!("{}", serde_json::to_string_pretty(&v)?);
        return Ok(exit_codes::OK);
    }

    println!("Requests:        {}", stats.total_requests);
    println!("  generated:     {}", stats.generated);
    println!("  cache hits:    {}", stats.cache_hits);
    println!("  failed:        {}", stats.failed);
    println!("Tokens used:     {}", stats.total_tokens);
    println!("Cached diagrams: {}", entries);
    if let Some(avg) = stats.avg_generation_ms {
        println!("Avg generation:  {:.0} ms", avg);
    }
    if let Some(rate) = stats.success_rate() {
        println!("Success rate:    {:.1}%", rate * 100.0);
    }
    if let Some(rate) = stats.cache_hit_rate() {
        println!("Cache hit rate:  {:.1}%", rate * 100.0);
    }
    Ok(exit_codes::OK)
}

pub fn cmd_history(args: HistoryArgs, db: &Path) -> anyhow::Result<i32> {
    let store = open_store(db)?;
    let records = store.recent_audit(args.limit)?;

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(exit_codes::OK);
    }

    if records.is_empty() {
        eprintln!("no generations recorded yet");
        return Ok(exit_codes::OK);
    }
    for r in &records {
        let detail = match (&r.stage, &r.error_kind) {
            (Some(stage), Some(kind)) => format!(" [{}: {}]", stage, kind),
            _ => String::new(),
        };
        println!(
            "{}  {}  {:<9} {:<10}{} {}/{} {}ms",
            r.created_at.format("%Y-%m-%d %H:%M:%S"),
            r.fingerprint.short(),
            r.kind.as_str(),
            r.outcome.as_str(),
            detail,
            r.provider,
            r.model,
            r.latency.total_ms
        );
    }
    Ok(exit_codes::OK)
}
