use crate::errors::CacheError;
use crate::fingerprint::Fingerprint;
use crate::model::{AuditRecord, CacheEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod memory;
pub mod schema;
pub mod store;

pub use memory::MemoryStore;
pub use store::Store;

/// Content-addressed persistence for finished generations.
///
/// Every operation is atomic on its own; `insert_if_absent` is the only
/// writer and the first entry stored for a fingerprint wins.
#[async_trait]
pub trait GenerationStore: Send + Sync {
    /// Reads an entry without counting it as a hit.
    async fn peek(&self, fp: &Fingerprint) -> Result<Option<CacheEntry>, CacheError>;

    /// Reads an entry and increments its hit count; returns the updated entry.
    async fn hit(&self, fp: &Fingerprint) -> Result<Option<CacheEntry>, CacheError>;

    /// Stores `entry` unless one already exists; returns whichever is stored.
    async fn insert_if_absent(&self, entry: CacheEntry) -> Result<CacheEntry, CacheError>;

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, CacheError>;
}

/// Append-only destination for per-request audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> Result<(), CacheError>;
}
