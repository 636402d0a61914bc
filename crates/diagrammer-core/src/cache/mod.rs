use crate::errors::{CacheError, PipelineError};
use crate::fingerprint::Fingerprint;
use crate::model::{CacheEntry, DiagramKind, MarkupArtifact, RenderedArtifact};
use crate::storage::GenerationStore;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

/// Where a resolved entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Already stored when the caller arrived.
    Cached,
    /// This caller led the generation.
    Generated,
    /// This caller waited on another caller's in-flight generation.
    Coalesced,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub entry: Arc<CacheEntry>,
    pub origin: Origin,
}

/// A caller's view of one single-flight resolution.
#[derive(Debug, Clone)]
pub struct Flight {
    pub coalesced: bool,
    pub result: Result<Resolution, PipelineError>,
}

#[derive(Debug, Clone)]
struct Settled {
    entry: Arc<CacheEntry>,
    fresh: bool,
}

type Slot = Option<Result<Settled, PipelineError>>;
type InFlight = Arc<Mutex<HashMap<Fingerprint, watch::Receiver<Slot>>>>;

/// Fingerprint-keyed cache over a [`GenerationStore`], with single-flight
/// coalescing of concurrent misses.
#[derive(Clone)]
pub struct GenerationCache {
    store: Arc<dyn GenerationStore>,
    in_flight: InFlight,
}

impl GenerationCache {
    pub fn new(store: Arc<dyn GenerationStore>) -> Self {
        Self {
            store,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Stored entry for `fp`, counting a hit. Never waits on in-flight work.
    pub async fn lookup(&self, fp: &Fingerprint) -> Result<Option<Arc<CacheEntry>>, CacheError> {
        Ok(self.store.hit(fp).await?.map(Arc::new))
    }

    /// Returns the stored entry for `fp`, or runs `generate` exactly once across
    /// all concurrent callers for `fp` and stores its result.
    ///
    /// The generation runs on its own task: dropping the returned future does
    /// not cancel it, and its result is stored even if nobody is left waiting.
    /// A failure stores nothing and reaches every waiter of that attempt.
    pub async fn get_or_create<F, Fut>(
        &self,
        fp: &Fingerprint,
        generate: F,
    ) -> Result<Resolution, PipelineError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<CacheEntry, PipelineError>> + Send + 'static,
    {
        self.resolve(fp, generate).await.result
    }

    /// Like [`get_or_create`](Self::get_or_create), but also reports whether the
    /// caller joined someone else's generation, on failure as well as success.
    pub async fn resolve<F, Fut>(&self, fp: &Fingerprint, generate: F) -> Flight
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<CacheEntry, PipelineError>> + Send + 'static,
    {
        match self.lookup(fp).await {
            Ok(Some(entry)) => {
                tracing::debug!(event = "cache.hit", fingerprint = fp.short());
                return Flight {
                    coalesced: false,
                    result: Ok(Resolution {
                        entry,
                        origin: Origin::Cached,
                    }),
                };
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(event = "cache.lookup_failed", fingerprint = fp.short(), error = %e);
            }
        }

        let (mut rx, leader) = {
            let mut map = lock(&self.in_flight);
            match map.get(fp) {
                Some(rx) => (rx.clone(), false),
                None => {
                    let (tx, rx) = watch::channel(None);
                    map.insert(fp.clone(), rx.clone());
                    self.spawn_generation(fp.clone(), tx, generate);
                    (rx, true)
                }
            }
        };

        if !leader {
            tracing::debug!(event = "cache.coalesced", fingerprint = fp.short());
        }

        let slot = match rx.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };

        let result = match slot {
            Some(Ok(settled)) => Ok(Resolution {
                entry: settled.entry,
                origin: match (leader, settled.fresh) {
                    (false, _) => Origin::Coalesced,
                    (true, true) => Origin::Generated,
                    (true, false) => Origin::Cached,
                },
            }),
            Some(Err(e)) => Err(e),
            None => Err(PipelineError::Aborted),
        };
        Flight {
            coalesced: !leader,
            result,
        }
    }

    fn spawn_generation<F, Fut>(&self, fp: Fingerprint, tx: watch::Sender<Slot>, generate: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<CacheEntry, PipelineError>> + Send + 'static,
    {
        let store = self.store.clone();
        let guard = InFlightGuard {
            map: self.in_flight.clone(),
            fp: fp.clone(),
        };

        tokio::spawn(async move {
            tracing::debug!(event = "cache.miss", fingerprint = fp.short());
            let result = settle(store.as_ref(), &fp, generate).await;
            // Deregister before publishing so a failure is never handed to a later caller.
            drop(guard);
            tx.send_replace(Some(result));
        });
    }

    /// Idempotent; the first entry stored for a fingerprint wins and is returned.
    pub async fn insert(
        &self,
        fp: &Fingerprint,
        kind: DiagramKind,
        markup: MarkupArtifact,
        rendered: RenderedArtifact,
    ) -> Result<Arc<CacheEntry>, CacheError> {
        let entry = CacheEntry::new(fp.clone(), kind, markup, rendered);
        Ok(Arc::new(self.store.insert_if_absent(entry).await?))
    }

    /// Removes entries created more than `age` ago. Returns how many were removed.
    pub async fn evict_older_than(&self, age: Duration) -> Result<u64, CacheError> {
        let cutoff = chrono::Duration::from_std(age)
            .ok()
            .and_then(|d| chrono::Utc::now().checked_sub_signed(d));
        let Some(cutoff) = cutoff else {
            return Ok(0);
        };
        let removed = self.store.delete_older_than(cutoff).await?;
        tracing::info!(event = "cache.evicted", removed, cutoff = %cutoff);
        Ok(removed)
    }

    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }
}

async fn settle<F, Fut>(
    store: &dyn GenerationStore,
    fp: &Fingerprint,
    generate: F,
) -> Result<Settled, PipelineError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<CacheEntry, PipelineError>>,
{
    // Another caller may have stored the entry between our lookup and registration.
    match store.hit(fp).await {
        Ok(Some(entry)) => {
            return Ok(Settled {
                entry: Arc::new(entry),
                fresh: false,
            })
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(event = "cache.lookup_failed", fingerprint = fp.short(), error = %e);
        }
    }

    let entry = generate().await?;
    let stored = match store.insert_if_absent(entry.clone()).await {
        Ok(stored) => stored,
        Err(e) => {
            tracing::warn!(event = "cache.store_failed", fingerprint = fp.short(), error = %e);
            entry
        }
    };
    Ok(Settled {
        entry: Arc::new(stored),
        fresh: true,
    })
}

struct InFlightGuard {
    map: InFlight,
    fp: Fingerprint,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.map).remove(&self.fp);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
