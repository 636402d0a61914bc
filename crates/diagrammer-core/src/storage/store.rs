use super::{AuditSink, GenerationStore};
use crate::errors::{CacheError, Stage};
use crate::fingerprint::Fingerprint;
use crate::model::{
    AuditOutcome, AuditRecord, CacheEntry, DiagramKind, LatencyBreakdown, MarkupArtifact,
    RenderedArtifact, UsageStats,
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// SQLite-backed generation store and audit log.
#[derive(Clone)]
pub struct Store {
    pub conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite db {}", path.display()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(crate::storage::schema::DDL)
            .context("failed to apply schema")?;
        Ok(())
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("sqlite connection lock poisoned"))
    }

    fn peek_sync(&self, fp: &Fingerprint) -> anyhow::Result<Option<CacheEntry>> {
        let conn = self.lock()?;
        read_entry(&conn, fp)
    }

    fn hit_sync(&self, fp: &Fingerprint) -> anyhow::Result<Option<CacheEntry>> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE diagrams SET hit_count = hit_count + 1 WHERE fingerprint = ?1",
            params![fp.as_str()],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        read_entry(&conn, fp)
    }

    fn insert_sync(&self, entry: &CacheEntry) -> anyhow::Result<CacheEntry> {
        let conn = self.lock()?;
        let markup_json = serde_json::to_string(&entry.markup)?;
        let inserted = conn.execute(
            "INSERT INTO diagrams(
                fingerprint, kind, markup_json, rendered, mime_type, engine_used,
                render_latency_ms, created_at, hit_count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(fingerprint) DO NOTHING",
            params![
                entry.fingerprint.as_str(),
                entry.kind.as_str(),
                markup_json,
                entry.rendered.bytes,
                entry.rendered.mime_type,
                entry.rendered.engine_used,
                entry.rendered.render_latency_ms as i64,
                ts(&entry.created_at),
                entry.hit_count as i64,
            ],
        )?;
        if inserted == 1 {
            return Ok(entry.clone());
        }
        read_entry(&conn, &entry.fingerprint)?
            .context("entry vanished between conflicting insert and read")
    }

    fn delete_sync(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let conn = self.lock()?;
        let n = conn.execute(
            "DELETE FROM diagrams WHERE created_at < ?1",
            params![ts(&cutoff)],
        )?;
        Ok(n as u64)
    }

    fn append_sync(&self, r: &AuditRecord) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO generation_logs(
                fingerprint, kind, outcome, stage, error_kind, coalesced, provider, model,
                token_usage, cache_ms, generation_ms, render_ms, total_ms, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                r.fingerprint.as_str(),
                r.kind.as_str(),
                r.outcome.as_str(),
                r.stage.map(|s| s.as_str()),
                r.error_kind,
                r.coalesced,
                r.provider,
                r.model,
                r.token_usage.map(i64::from),
                r.latency.cache_ms as i64,
                r.latency.generation_ms as i64,
                r.latency.render_ms as i64,
                r.latency.total_ms as i64,
                ts(&r.created_at),
            ],
        )?;
        Ok(())
    }

    /// Most recent audit records first.
    pub fn recent_audit(&self, limit: u32) -> anyhow::Result<Vec<AuditRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT fingerprint, kind, outcome, stage, error_kind, coalesced, provider, model,
                    token_usage, cache_ms, generation_ms, render_ms, total_ms, created_at
             FROM generation_logs
             ORDER BY id DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit], |row| {
            Ok(AuditRow {
                fingerprint: row.get(0)?,
                kind: row.get(1)?,
                outcome: row.get(2)?,
                stage: row.get(3)?,
                error_kind: row.get(4)?,
                coalesced: row.get(5)?,
                provider: row.get(6)?,
                model: row.get(7)?,
                token_usage: row.get(8)?,
                latency: LatencyBreakdown {
                    cache_ms: row.get::<_, i64>(9)? as u64,
                    generation_ms: row.get::<_, i64>(10)? as u64,
                    render_ms: row.get::<_, i64>(11)? as u64,
                    total_ms: row.get::<_, i64>(12)? as u64,
                },
                created_at: row.get(13)?,
            })
        })?;

        let mut out = Vec::new();
        for r in rows {
            out.push(r?.into_record()?);
        }
        Ok(out)
    }

    /// Totals over the whole audit log.
    pub fn usage_stats(&self) -> anyhow::Result<UsageStats> {
        let conn = self.lock()?;
        let stats = conn.query_row(
            "SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN outcome = 'generated' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN outcome = 'cache_hit' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN outcome = 'failed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(token_usage), 0),
                AVG(CASE WHEN outcome = 'generated' THEN generation_ms END)
             FROM generation_logs",
            [],
            |row| {
                Ok(UsageStats {
                    total_requests: row.get::<_, i64>(0)? as u64,
                    generated: row.get::<_, i64>(1)? as u64,
                    cache_hits: row.get::<_, i64>(2)? as u64,
                    failed: row.get::<_, i64>(3)? as u64,
                    total_tokens: row.get::<_, i64>(4)? as u64,
                    avg_generation_ms: row.get(5)?,
                })
            },
        )?;
        Ok(stats)
    }

    pub fn delete_audit_older_than(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let conn = self.lock()?;
        let n = conn.execute(
            "DELETE FROM generation_logs WHERE created_at < ?1",
            params![ts(&cutoff)],
        )?;
        Ok(n as u64)
    }

    pub fn entry_count(&self) -> anyhow::Result<u64> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM diagrams", [], |r| r.get(0))?;
        Ok(n as u64)
    }
}

// Fixed-width UTC timestamps so lexical order matches time order in SQL.
fn ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("bad timestamp in store: {}", s))?
        .with_timezone(&Utc))
}

fn parse_fp(s: &str) -> anyhow::Result<Fingerprint> {
    Fingerprint::from_hex(s).with_context(|| format!("bad fingerprint in store: {}", s))
}

fn read_entry(conn: &Connection, fp: &Fingerprint) -> anyhow::Result<Option<CacheEntry>> {
    let row = conn
        .query_row(
            "SELECT kind, markup_json, rendered, mime_type, engine_used, render_latency_ms,
                    created_at, hit_count
             FROM diagrams WHERE fingerprint = ?1",
            params![fp.as_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, i64>(7)?,
                ))
            },
        )
        .optional()?;

    let Some((kind, markup_json, bytes, mime_type, engine_used, latency, created_at, hits)) = row
    else {
        return Ok(None);
    };

    let markup: MarkupArtifact =
        serde_json::from_str(&markup_json).context("corrupt markup_json in diagrams")?;
    Ok(Some(CacheEntry {
        fingerprint: fp.clone(),
        kind: DiagramKind::parse(&kind)?,
        markup,
        rendered: RenderedArtifact {
            bytes,
            mime_type,
            engine_used,
            render_latency_ms: latency as u64,
        },
        created_at: parse_ts(&created_at)?,
        hit_count: hits as u64,
    }))
}

struct AuditRow {
    fingerprint: String,
    kind: String,
    outcome: String,
    stage: Option<String>,
    error_kind: Option<String>,
    coalesced: bool,
    provider: String,
    model: String,
    token_usage: Option<i64>,
    latency: LatencyBreakdown,
    created_at: String,
}

impl AuditRow {
    fn into_record(self) -> anyhow::Result<AuditRecord> {
        Ok(AuditRecord {
            fingerprint: parse_fp(&self.fingerprint)?,
            kind: DiagramKind::parse(&self.kind)?,
            outcome: AuditOutcome::parse(&self.outcome),
            stage: self.stage.as_deref().and_then(Stage::parse),
            error_kind: self.error_kind,
            coalesced: self.coalesced,
            provider: self.provider,
            model: self.model,
            token_usage: self.token_usage.map(|t| t as u32),
            latency: self.latency,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

fn store_err(e: anyhow::Error) -> CacheError {
    CacheError::unavailable(format!("{:#}", e))
}

#[async_trait]
impl GenerationStore for Store {
    async fn peek(&self, fp: &Fingerprint) -> Result<Option<CacheEntry>, CacheError> {
        self.peek_sync(fp).map_err(store_err)
    }

    async fn hit(&self, fp: &Fingerprint) -> Result<Option<CacheEntry>, CacheError> {
        self.hit_sync(fp).map_err(store_err)
    }

    async fn insert_if_absent(&self, entry: CacheEntry) -> Result<CacheEntry, CacheError> {
        self.insert_sync(&entry).map_err(store_err)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, CacheError> {
        self.delete_sync(cutoff).map_err(store_err)
    }
}

#[async_trait]
impl AuditSink for Store {
    async fn append(&self, record: &AuditRecord) -> Result<(), CacheError> {
        self.append_sync(record).map_err(store_err)
    }
}
