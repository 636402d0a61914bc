use super::{exit_codes, open_store};
use crate::cli::args::EvictArgs;
use diagrammer_core::cache::GenerationCache;
use diagrammer_core::config::AppConfig;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub async fn run(args: EvictArgs, cfg: &AppConfig, db: &Path) -> anyhow::Result<i32> {
    let days = args.older_than_days.unwrap_or(cfg.cache.retention_days);
    let age = Duration::from_secs(u64::from(days) * 24 * 60 * 60);

    let store = Arc::new(open_store(db)?);
    let cache = GenerationCache::new(store.clone());
    let removed = cache.evict_older_than(age).await?;

    let audit_removed = if args.audit {
        // A cutoff before the representable range leaves nothing older than it.
        let cutoff = chrono::Duration::try_days(i64::from(days))
            .and_then(|d| chrono::Utc::now().checked_sub_signed(d));
        match cutoff {
            Some(cutoff) => Some(store.delete_audit_older_than(cutoff)?),
            None => Some(0),
        }
    } else {
        None
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "older_than_days": days,
            "diagrams_removed": removed,
            "audit_records_removed": audit_removed,
        }))?
    );
    Ok(exit_codes::OK)
}
