use super::{AuditSink, GenerationStore};
use crate::errors::CacheError;
use crate::fingerprint::Fingerprint;
use crate::model::{AuditRecord, CacheEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Process-local store and audit sink. Can be switched into a failing mode
/// to simulate an unreachable database.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<Fingerprint, CacheEntry>>,
    audit: Mutex<Vec<AuditRecord>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn audit_records(&self) -> Vec<AuditRecord> {
        lock(&self.audit).map(|v| v.clone()).unwrap_or_default()
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::unavailable("memory store switched off"));
        }
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, CacheError> {
    m.lock().map_err(|_| CacheError::unavailable("memory store lock poisoned"))
}

#[async_trait]
impl GenerationStore for MemoryStore {
    async fn peek(&self, fp: &Fingerprint) -> Result<Option<CacheEntry>, CacheError> {
        self.check()?;
        Ok(lock(&self.entries)?.get(fp).cloned())
    }

    async fn hit(&self, fp: &Fingerprint) -> Result<Option<CacheEntry>, CacheError> {
        self.check()?;
        let mut entries = lock(&self.entries)?;
        Ok(entries.get_mut(fp).map(|e| {
            e.hit_count += 1;
            e.clone()
        }))
    }

    async fn insert_if_absent(&self, entry: CacheEntry) -> Result<CacheEntry, CacheError> {
        self.check()?;
        let mut entries = lock(&self.entries)?;
        Ok(entries
            .entry(entry.fingerprint.clone())
            .or_insert(entry)
            .clone())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, CacheError> {
        self.check()?;
        let mut entries = lock(&self.entries)?;
        let before = entries.len();
        entries.retain(|_, e| e.created_at >= cutoff);
        Ok((before - entries.len()) as u64)
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn append(&self, record: &AuditRecord) -> Result<(), CacheError> {
        self.check()?;
        lock(&self.audit)?.push(record.clone());
        Ok(())
    }
}
