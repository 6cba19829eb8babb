//! Knowledge Cache with single-flight refresh
//!
//! Information Hiding:
//! - Entry freshness bookkeeping hidden behind `get`
//! - Refresh coordination (one fetch per generation) hidden from callers
//! - Fetch failures never escape: stale rows or an empty table are served instead

use super::{KnowledgeRow, KnowledgeSource};
use crate::error::FetchError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{timeout, Instant};

struct CacheEntry {
    rows: Arc<Vec<KnowledgeRow>>,
    fetched_at: Instant,
    /// Invalidation epoch at the moment the fetch that produced `rows` started.
    epoch: u64,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant, ttl: Duration, epoch: u64) -> bool {
        self.epoch == epoch && now.saturating_duration_since(self.fetched_at) < ttl
    }
}

pub struct KnowledgeCache {
    source: Arc<dyn KnowledgeSource>,
    ttl: Duration,
    fetch_timeout: Duration,
    entry: RwLock<Option<CacheEntry>>,
    refresh: Mutex<()>,
    /// Completed fetch attempts, successful or not.
    generation: AtomicU64,
    /// Bumped by `invalidate`.
    epoch: AtomicU64,
    /// Epoch the most recently completed attempt started in.
    completed_epoch: AtomicU64,
}

impl KnowledgeCache {
    pub fn new(source: Arc<dyn KnowledgeSource>, ttl: Duration, fetch_timeout: Duration) -> Self {
        Self {
            source,
            ttl,
            fetch_timeout,
            entry: RwLock::new(None),
            refresh: Mutex::new(()),
            generation: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            completed_epoch: AtomicU64::new(0),
        }
    }

    /// Current rows, refetching first when the entry is absent, expired or invalidated.
    ///
    /// Callers that arrive while a refetch is in flight wait for it and share
    /// its outcome instead of issuing their own.
    pub async fn get(&self) -> Arc<Vec<KnowledgeRow>> {
        if let Some(rows) = self.fresh_rows().await {
            tracing::debug!("[KnowledgeCache] Cache hit ({} rows)", rows.len());
            return rows;
        }

        let seen_generation = self.generation.load(Ordering::Acquire);
        let _refresh = self.refresh.lock().await;

        let epoch = self.epoch.load(Ordering::Acquire);
        if self.generation.load(Ordering::Acquire) != seen_generation
            && self.completed_epoch.load(Ordering::Acquire) == epoch
        {
            // A refetch finished while we waited and nothing was invalidated
            // since it started; share its outcome.
            return self.current_rows().await;
        }
        if let Some(rows) = self.fresh_rows().await {
            return rows;
        }

        let result = match timeout(self.fetch_timeout, self.source.fetch_rows()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.fetch_timeout)),
        };

        let rows = match result {
            Ok(rows) => {
                tracing::info!("[KnowledgeCache] Refreshed knowledge table ({} rows)", rows.len());
                let rows = Arc::new(rows);
                *self.entry.write().await = Some(CacheEntry {
                    rows: Arc::clone(&rows),
                    fetched_at: Instant::now(),
                    epoch,
                });
                rows
            }
            Err(e) => {
                let stale = self.current_rows().await;
                tracing::warn!(
                    "[KnowledgeCache] Fetch failed, serving {} cached rows: {}",
                    stale.len(),
                    e
                );
                stale
            }
        };

        self.completed_epoch.store(epoch, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
        rows
    }

    /// Force the next `get` to refetch, including when a refetch is already
    /// in flight: rows from a fetch that started before this call are never
    /// treated as fresh. Cached rows remain available as a fallback should
    /// the refetch fail.
    pub fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        tracing::info!("[KnowledgeCache] Invalidated");
    }

    async fn fresh_rows(&self) -> Option<Arc<Vec<KnowledgeRow>>> {
        let epoch = self.epoch.load(Ordering::Acquire);
        let entry = self.entry.read().await;
        entry
            .as_ref()
            .filter(|entry| entry.is_fresh(Instant::now(), self.ttl, epoch))
            .map(|entry| Arc::clone(&entry.rows))
    }

    async fn current_rows(&self) -> Arc<Vec<KnowledgeRow>> {
        let entry = self.entry.read().await;
        entry
            .as_ref()
            .map(|entry| Arc::clone(&entry.rows))
            .unwrap_or_default()
    }
}
