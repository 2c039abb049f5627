//! Write-back cache for per-category progress and navigation history.
//!
//! The cache absorbs the high-frequency updates produced while the user
//! swipes through a category and coalesces them into occasional storage
//! writes. Reads are always served from memory after the initial prime;
//! writes are debounced, merged as subtree deltas into the persisted
//! record, and retried on failure.

use crate::config::PersistenceConfig;
use crate::error::{Result, SweepError};
use crate::store::SessionStore;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use sweep_types::{CategoryKind, CategoryProgress, CategoryProgressPatch, NavigationEntry};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Observability counters for the cache.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    /// Categories currently held in memory.
    pub cached_categories: usize,
    /// Dirty units awaiting a flush (categories, removals, history).
    pub pending_writes: usize,
    /// When the last successful flush completed.
    pub last_flush_time: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct CacheInner {
    categories: HashMap<String, CategoryProgress>,
    history: Vec<NavigationEntry>,
    dirty: HashSet<String>,
    removed: HashSet<String>,
    clear_all: bool,
    history_dirty: bool,
    last_flush: Option<DateTime<Utc>>,
    disposed: bool,
}

impl CacheInner {
    fn has_pending(&self) -> bool {
        !self.dirty.is_empty() || !self.removed.is_empty() || self.clear_all || self.history_dirty
    }

    fn pending_count(&self) -> usize {
        self.dirty.len()
            + self.removed.len()
            + usize::from(self.clear_all)
            + usize::from(self.history_dirty)
    }
}

/// Dirty subtree snapshot taken at flush time.
struct FlushDelta {
    categories: Vec<(String, CategoryProgress)>,
    removed: Vec<String>,
    clear_all: bool,
    history: Option<Vec<NavigationEntry>>,
}

#[derive(Default)]
struct CacheTimers {
    debounce: Option<JoinHandle<()>>,
    auto_flush: Option<JoinHandle<()>>,
}

/// In-memory, write-back cache over the `category_memory` and
/// `navigation_history` subtrees of the session record.
///
/// The cache owns a derived copy of those two subtrees; the persisted
/// record stays authoritative for everything else. At flush time only the
/// dirty deltas are merged into the freshly loaded record, so concurrent
/// writers of other subtrees are never clobbered.
///
/// Cheap to clone; clones share state. Constructing the cache requires a
/// running Tokio runtime (the auto-flush timer is spawned eagerly).
#[derive(Clone)]
pub struct CategoryProgressCache {
    store: Arc<dyn SessionStore>,
    config: Arc<PersistenceConfig>,
    inner: Arc<Mutex<CacheInner>>,
    timers: Arc<Mutex<CacheTimers>>,
}

impl CategoryProgressCache {
    /// Creates the cache and starts the periodic auto-flush timer when
    /// one is configured.
    pub fn new(store: Arc<dyn SessionStore>, config: PersistenceConfig) -> Self {
        let cache = Self {
            store,
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(CacheInner::default())),
            timers: Arc::new(Mutex::new(CacheTimers::default())),
        };

        if let Some(interval) = cache.config.auto_flush_interval {
            let periodic = cache.clone();
            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                // The first tick completes immediately; skip it.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let pending = periodic.inner.lock().await.has_pending();
                    if pending {
                        if let Err(error) = periodic.flush_now().await {
                            tracing::warn!(%error, "periodic cache flush failed");
                        }
                    }
                }
            });
            // The mutex is freshly created and uncontended.
            cache
                .timers
                .try_lock()
                .expect("fresh timer lock")
                .auto_flush = Some(handle);
        }

        cache
    }

    /// Loads the persisted record once and populates the cache from it.
    ///
    /// After this call every read is served from memory; storage is only
    /// touched again at flush time. A read failure degrades to an empty
    /// cache.
    pub async fn prime(&self) {
        let loaded = match self.store.load().await {
            Ok(record) => record,
            Err(error) => {
                tracing::warn!(%error, "priming cache from storage failed; starting empty");
                None
            }
        };

        let mut inner = self.inner.lock().await;
        if let Some(record) = loaded {
            inner.categories = record.progress.category_memory;
            inner.history = record.progress.navigation_history;
        }
    }

    /// Merges a partial update into the cached entry for `category_id`.
    ///
    /// Missing fields are preserved, `last_access_time` is stamped with
    /// the current time, and a debounced flush is scheduled. Rapid updates
    /// within the debounce window coalesce into one write.
    pub async fn update_category_progress(&self, category_id: &str, patch: CategoryProgressPatch) {
        if category_id.is_empty() {
            tracing::warn!("ignoring category update with empty identifier");
            return;
        }

        let now = Utc::now();
        {
            let mut inner = self.inner.lock().await;
            let entry = inner
                .categories
                .entry(category_id.to_string())
                .or_insert_with(|| {
                    CategoryProgress::new(
                        patch.category_type.unwrap_or(CategoryKind::Month),
                        now,
                    )
                });
            entry.apply(&patch, now);
            inner.removed.remove(category_id);
            inner.dirty.insert(category_id.to_string());
        }

        self.schedule_debounce(self.config.debounce_delay).await;
    }

    /// Returns the cached entry, or `None` for unknown or empty
    /// identifiers. Never touches storage.
    pub async fn get_category_progress(&self, category_id: &str) -> Option<CategoryProgress> {
        if category_id.is_empty() {
            return None;
        }
        self.inner.lock().await.categories.get(category_id).cloned()
    }

    /// Clears one category, or all of them when no identifier is given,
    /// and schedules a flush that applies the removal to storage.
    pub async fn reset_category_progress(&self, category_id: Option<&str>) {
        {
            let mut inner = self.inner.lock().await;
            match category_id {
                Some(id) => {
                    inner.categories.remove(id);
                    inner.dirty.remove(id);
                    inner.removed.insert(id.to_string());
                }
                None => {
                    inner.categories.clear();
                    inner.dirty.clear();
                    inner.removed.clear();
                    inner.clear_all = true;
                }
            }
        }

        self.schedule_debounce(self.config.debounce_delay).await;
    }

    /// Pushes a navigation entry to the front of the history, truncating
    /// to the configured bound, and schedules a flush.
    pub async fn update_navigation_state(&self, entry: NavigationEntry) {
        {
            let mut inner = self.inner.lock().await;
            inner.history.insert(0, entry);
            inner.history.truncate(self.config.max_history_entries);
            inner.history_dirty = true;
        }

        self.schedule_debounce(self.config.debounce_delay).await;
    }

    /// Current history, newest first.
    pub async fn get_navigation_history(&self) -> Vec<NavigationEntry> {
        self.inner.lock().await.history.clone()
    }

    /// Snapshot of every cached category entry.
    ///
    /// The cache is the authoritative owner of the `category_memory` and
    /// `navigation_history` subtrees once primed; the lifecycle manager
    /// overlays this snapshot onto the record before whole-record saves so
    /// a stale in-memory copy never clobbers flushed progress.
    pub async fn category_snapshot(&self) -> HashMap<String, CategoryProgress> {
        self.inner.lock().await.categories.clone()
    }

    /// Replaces the cached subtrees with the ones from `record`.
    ///
    /// Used when the lifecycle manager adopts a different record (resume
    /// reload, fresh session after a discarded one). Pending dirty state
    /// belongs to the abandoned record and is dropped.
    pub async fn reload_from(&self, record: &sweep_types::SessionRecord) {
        let mut inner = self.inner.lock().await;
        inner.categories = record.progress.category_memory.clone();
        inner.history = record.progress.navigation_history.clone();
        inner.dirty.clear();
        inner.removed.clear();
        inner.clear_all = false;
        inner.history_dirty = false;
    }

    /// Cancels any pending debounce timer and writes the dirty deltas
    /// immediately.
    pub async fn flush_pending_writes(&self) -> Result<()> {
        {
            let mut timers = self.timers.lock().await;
            if let Some(handle) = timers.debounce.take() {
                handle.abort();
            }
        }
        self.flush_now().await
    }

    /// Observability counters.
    pub async fn cache_stats(&self) -> CacheStats {
        let inner = self.inner.lock().await;
        CacheStats {
            cached_categories: inner.categories.len(),
            pending_writes: inner.pending_count(),
            last_flush_time: inner.last_flush,
        }
    }

    /// Stops the timers and performs a final best-effort flush.
    pub async fn dispose(&self) {
        {
            let mut inner = self.inner.lock().await;
            inner.disposed = true;
        }
        {
            let mut timers = self.timers.lock().await;
            if let Some(handle) = timers.debounce.take() {
                handle.abort();
            }
            if let Some(handle) = timers.auto_flush.take() {
                handle.abort();
            }
        }
        if let Err(error) = self.flush_now().await {
            tracing::warn!(%error, "final cache flush on dispose failed");
        }
    }

    /// (Re)arms the trailing debounce timer.
    async fn schedule_debounce(&self, delay: Duration) {
        if self.inner.lock().await.disposed {
            return;
        }

        let cache = self.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Errors re-arm the timer from within flush_now.
            let _ = cache.flush_now().await;
        });

        let mut timers = self.timers.lock().await;
        if let Some(previous) = timers.debounce.replace(task) {
            previous.abort();
        }
    }

    /// Snapshots the dirty deltas, merges them into the freshly loaded
    /// record, and saves. On failure the deltas stay dirty and the timer
    /// is re-armed at twice the debounce delay.
    fn flush_now(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
        let delta = {
            let mut inner = self.inner.lock().await;
            if !inner.has_pending() {
                return Ok(());
            }
            let delta = FlushDelta {
                categories: inner
                    .dirty
                    .iter()
                    .filter_map(|id| {
                        inner
                            .categories
                            .get(id)
                            .map(|entry| (id.clone(), entry.clone()))
                    })
                    .collect(),
                removed: inner.removed.iter().cloned().collect(),
                clear_all: inner.clear_all,
                history: inner.history_dirty.then(|| inner.history.clone()),
            };
            inner.dirty.clear();
            inner.removed.clear();
            inner.clear_all = false;
            inner.history_dirty = false;
            delta
        };

        match self.write_delta(&delta).await {
            Ok(()) => {
                let mut inner = self.inner.lock().await;
                inner.last_flush = Some(Utc::now());
                Ok(())
            }
            Err(error) => {
                tracing::warn!(%error, "cache flush failed; retaining dirty state");
                {
                    let mut inner = self.inner.lock().await;
                    for (id, _) in &delta.categories {
                        inner.dirty.insert(id.clone());
                    }
                    for id in &delta.removed {
                        inner.removed.insert(id.clone());
                    }
                    inner.clear_all |= delta.clear_all;
                    inner.history_dirty |= delta.history.is_some();
                }
                self.schedule_debounce(self.config.debounce_delay * 2).await;
                Err(error)
            }
        }
        })
    }

    /// Applies a delta to the persisted record. Only the cache-owned
    /// subtrees are touched; the rest of the record is preserved as
    /// loaded.
    async fn write_delta(&self, delta: &FlushDelta) -> Result<()> {
        let Some(mut record) = self.store.load().await? else {
            return Err(SweepError::storage_unavailable(
                "no persisted session to merge progress into",
            ));
        };

        if delta.clear_all {
            record.progress.category_memory.clear();
        }
        for id in &delta.removed {
            record.progress.category_memory.remove(id);
        }
        for (id, entry) in &delta.categories {
            record
                .progress
                .category_memory
                .insert(id.clone(), entry.clone());
        }
        if let Some(history) = &delta.history {
            record.progress.navigation_history = history.clone();
            record.progress.max_history_entries = self.config.max_history_entries;
        }
        record.last_saved = Utc::now();

        self.store.save(&record).await
    }
}
