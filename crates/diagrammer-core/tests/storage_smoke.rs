use chrono::{Duration, Utc};
use diagrammer_core::errors::Stage;
use diagrammer_core::fingerprint::{self, Fingerprint};
use diagrammer_core::model::{
    AuditOutcome, AuditRecord, CacheEntry, DiagramKind, GenerationRequest, LatencyBreakdown,
    MarkupArtifact, MarkupSource, ModelIdentity, RenderedArtifact,
};
use diagrammer_core::storage::{AuditSink, GenerationStore, Store};
use tempfile::tempdir;

fn fp(prompt: &str) -> Fingerprint {
    fingerprint::compute(&GenerationRequest::new(
        DiagramKind::Breakdown,
        prompt,
        ModelIdentity::new("nvidia", "meta/llama-3.1-70b-instruct"),
    ))
}

fn entry(fp: &Fingerprint, markup: &str) -> CacheEntry {
    CacheEntry::new(
        fp.clone(),
        DiagramKind::Breakdown,
        MarkupArtifact {
            raw_markup: format!("```plantuml\n{}\n```", markup),
            sanitized_markup: markup.to_string(),
            source: MarkupSource {
                provider: "nvidia".into(),
                model: "meta/llama-3.1-70b-instruct".into(),
                token_usage: Some(321),
                latency_ms: 900,
                attempts: 2,
                fallback: false,
            },
        },
        RenderedArtifact {
            bytes: vec![0x89, b'P', b'N', b'G', 0, 1, 2, 3],
            mime_type: "image/png".into(),
            engine_used: "plantuml".into(),
            render_latency_ms: 120,
        },
    )
}

fn record(fp: &Fingerprint, outcome: AuditOutcome, tokens: Option<u32>, gen_ms: u64) -> AuditRecord {
    AuditRecord {
        fingerprint: fp.clone(),
        kind: DiagramKind::Breakdown,
        outcome,
        stage: (outcome == AuditOutcome::Failed).then_some(Stage::Generation),
        error_kind: (outcome == AuditOutcome::Failed).then(|| "timeout".to_string()),
        coalesced: false,
        provider: "nvidia".into(),
        model: "meta/llama-3.1-70b-instruct".into(),
        token_usage: tokens,
        latency: LatencyBreakdown {
            cache_ms: 1,
            generation_ms: gen_ms,
            render_ms: 10,
            total_ms: gen_ms + 11,
        },
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_storage_smoke_lifecycle() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("nested").join("diagrams.db");

    let store = Store::open(&db_path)?;
    store.init_schema()?;

    let key = fp("build a mobile app");
    assert!(store.peek(&key).await?.is_none());
    assert!(store.hit(&key).await?.is_none());

    let first = entry(&key, "@startwbs\n* App\n@endwbs");
    let stored = store.insert_if_absent(first.clone()).await?;
    assert_eq!(stored.markup, first.markup);

    // First writer wins.
    let loser = entry(&key, "@startwbs\n* Other\n@endwbs");
    let stored = store.insert_if_absent(loser).await?;
    assert_eq!(stored.markup.sanitized_markup, "@startwbs\n* App\n@endwbs");
    assert_eq!(store.entry_count()?, 1);

    let hit = store.hit(&key).await?.expect("entry");
    assert_eq!(hit.hit_count, 1);
    assert_eq!(hit.rendered, first.rendered);
    assert_eq!(hit.markup.source.attempts, 2);
    assert_eq!(store.hit(&key).await?.expect("entry").hit_count, 2);
    assert_eq!(store.peek(&key).await?.expect("entry").hit_count, 2);

    // Reopening sees the same data.
    drop(store);
    let reopened = Store::open(&db_path)?;
    reopened.init_schema()?;
    assert!(reopened.peek(&key).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_eviction_by_age() -> anyhow::Result<()> {
    let store = Store::memory()?;
    store.init_schema()?;

    let old_key = fp("old roadmap");
    let mut old = entry(&old_key, "@startwbs\n* Old\n@endwbs");
    old.created_at = Utc::now() - Duration::days(45);
    store.insert_if_absent(old).await?;

    let new_key = fp("new roadmap");
    store
        .insert_if_absent(entry(&new_key, "@startwbs\n* New\n@endwbs"))
        .await?;

    let removed = store.delete_older_than(Utc::now() - Duration::days(30)).await?;
    assert_eq!(removed, 1);
    assert!(store.peek(&old_key).await?.is_none());
    assert!(store.peek(&new_key).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_audit_log_and_usage_stats() -> anyhow::Result<()> {
    let store = Store::memory()?;
    store.init_schema()?;
    let key = fp("quarterly plan");

    assert_eq!(store.usage_stats()?.total_requests, 0);
    assert_eq!(store.usage_stats()?.success_rate(), None);

    store
        .append(&record(&key, AuditOutcome::Generated, Some(300), 1000))
        .await?;
    store
        .append(&record(&key, AuditOutcome::Generated, Some(100), 3000))
        .await?;
    store.append(&record(&key, AuditOutcome::CacheHit, None, 0)).await?;
    store.append(&record(&key, AuditOutcome::Failed, None, 0)).await?;

    let stats = store.usage_stats()?;
    assert_eq!(stats.total_requests, 4);
    assert_eq!(stats.generated, 2);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.total_tokens, 400);
    assert_eq!(stats.avg_generation_ms, Some(2000.0));
    assert_eq!(stats.success_rate(), Some(0.75));
    assert_eq!(stats.cache_hit_rate(), Some(0.25));

    let recent = store.recent_audit(2)?;
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].outcome, AuditOutcome::Failed);
    assert_eq!(recent[0].stage, Some(Stage::Generation));
    assert_eq!(recent[0].error_kind.as_deref(), Some("timeout"));
    assert_eq!(recent[1].outcome, AuditOutcome::CacheHit);
    assert_eq!(recent[1].fingerprint, key);

    let removed = store.delete_audit_older_than(Utc::now() + Duration::seconds(5))?;
    assert_eq!(removed, 4);
    assert_eq!(store.usage_stats()?.total_requests, 0);
    Ok(())
}
