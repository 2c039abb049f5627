//! Generalized change tracking and auto-save coordination.
//!
//! Any part of the application can hand this component a keyed, prioritized
//! payload; the tracker buffers it and decides when to persist. Critical
//! changes take a short one-shot fast path, everything else rides the
//! periodic auto-save tick. On a background transition the tracker races a
//! best-effort save against a hard timeout, and on startup it replays the
//! most recent snapshot record so work interrupted by a kill is persisted
//! again through the normal path.

use crate::config::PersistenceConfig;
use crate::error::Result;
use crate::events::{EventBus, PersistenceEvent};
use crate::phase::{AppPhase, AppPhaseFeed};
use crate::store::SessionStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use sweep_types::{ChangePriority, ChangeSnapshot, ProgressChange};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Snapshot records kept in the backup log.
const SNAPSHOT_KEEP_COUNT: usize = 5;

/// Async hook invoked inside the background-transition save path, used by
/// the lifecycle manager to piggyback a session save on the same budget.
pub type SessionSaveHook =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Observability counters for the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerStats {
    /// Whether `start()` has run and `dispose()` has not.
    pub is_tracking: bool,
    /// Changes currently buffered.
    pub pending_changes: usize,
    /// When the last save fully succeeded.
    pub last_save_time: Option<DateTime<Utc>>,
    /// Last phase observed from the host.
    pub current_phase: AppPhase,
    /// Whether a background-transition save is in flight.
    pub background_task_active: bool,
}

/// Buffer entry: the change plus a monotonically increasing sequence
/// number used both as an insertion-order tiebreak and as a guard so a
/// save only clears entries it actually captured.
struct BufferedChange {
    change: ProgressChange,
    seq: u64,
}

#[derive(Default)]
struct TrackerInner {
    changes: HashMap<String, BufferedChange>,
    next_seq: u64,
    last_save: Option<DateTime<Utc>>,
    retry_attempt: u32,
    is_tracking: bool,
    background_task_active: bool,
    critical_armed: bool,
    disposed: bool,
}

#[derive(Default)]
struct TrackerTasks {
    auto_save: Option<JoinHandle<()>>,
    critical: Option<JoinHandle<()>>,
    retry: Option<JoinHandle<()>>,
    phase_watcher: Option<JoinHandle<()>>,
}

/// Buffer of keyed, prioritized changes with priority-aware persistence.
///
/// Cheap to clone; clones share state. Requires a running Tokio runtime.
#[derive(Clone)]
pub struct ChangeTracker {
    store: Arc<dyn SessionStore>,
    config: Arc<PersistenceConfig>,
    phase: AppPhaseFeed,
    events: EventBus,
    inner: Arc<Mutex<TrackerInner>>,
    tasks: Arc<Mutex<TrackerTasks>>,
    save_hook: Arc<std::sync::RwLock<Option<SessionSaveHook>>>,
}

impl ChangeTracker {
    /// Creates a tracker bound to a store and the app phase feed.
    ///
    /// No timers run until [`start`](Self::start) is called.
    pub fn new(
        store: Arc<dyn SessionStore>,
        config: PersistenceConfig,
        phase: AppPhaseFeed,
    ) -> Self {
        Self {
            store,
            config: Arc::new(config),
            phase,
            events: EventBus::new(),
            inner: Arc::new(Mutex::new(TrackerInner::default())),
            tasks: Arc::new(Mutex::new(TrackerTasks::default())),
            save_hook: Arc::new(std::sync::RwLock::new(None)),
        }
    }

    /// Listener registry for tracker events (`changes_dropped`).
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Registers the hook invoked inside the background save path.
    pub fn set_session_save_hook(&self, hook: SessionSaveHook) {
        *self.save_hook.write().expect("save hook lock poisoned") = Some(hook);
    }

    /// Begins tracking: replays the most recent snapshot record left by a
    /// previous run, prunes the backup log, and starts the periodic
    /// auto-save and the app-phase watcher.
    pub async fn start(&self) {
        self.recover_from_snapshots().await;

        {
            let mut inner = self.inner.lock().await;
            inner.is_tracking = true;
        }

        if self.config.auto_save_enabled {
            self.start_auto_save().await;
        }

        let tracker = self.clone();
        let mut rx = self.phase.subscribe();
        let watcher = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let phase = *rx.borrow_and_update();
                if phase.is_backgrounded() {
                    tracker.on_background().await;
                } else {
                    tracker.on_foreground().await;
                }
            }
        });
        self.tasks.lock().await.phase_watcher = Some(watcher);
    }

    /// Inserts or overwrites a buffered change; the last write for a key
    /// wins and no history is kept.
    ///
    /// A critical change arms the one-shot fast-path timer; normal and low
    /// changes wait for the next auto-save tick or an explicit save.
    pub async fn track_change(
        &self,
        key: impl Into<String>,
        data: serde_json::Value,
        priority: ChangePriority,
    ) {
        let key = key.into();
        let arm_critical = {
            let mut inner = self.inner.lock().await;
            if inner.disposed {
                return;
            }
            inner.next_seq += 1;
            let seq = inner.next_seq;
            inner.changes.insert(
                key.clone(),
                BufferedChange {
                    change: ProgressChange::new(key, data, priority, Utc::now()),
                    seq,
                },
            );
            let arm = priority == ChangePriority::Critical && !inner.critical_armed;
            if arm {
                inner.critical_armed = true;
            }
            arm
        };

        if arm_critical {
            let tracker = self.clone();
            let delay = self.config.critical_save_delay;
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                tracker.inner.lock().await.critical_armed = false;
                if let Err(error) = tracker.save_progress(false).await {
                    tracing::warn!(%error, "critical fast-path save failed");
                }
            });
            let mut tasks = self.tasks.lock().await;
            if let Some(previous) = tasks.critical.replace(handle) {
                previous.abort();
            }
        }
    }

    /// Persists the buffered changes in priority order.
    ///
    /// No-op when the buffer is empty and `force` is false. Changes are
    /// sorted (priority, then insertion time), partitioned into batches,
    /// and each batch is written as an independent snapshot record. A
    /// batch failure re-buffers the survivors with an incremented retry
    /// count, drops-and-reports the exhausted ones, and schedules an
    /// exponential-backoff retry.
    pub async fn save_progress(&self, force: bool) -> Result<()> {
        let captured = {
            let inner = self.inner.lock().await;
            if inner.changes.is_empty() && !force {
                return Ok(());
            }
            let mut captured: Vec<(ProgressChange, u64)> = inner
                .changes
                .values()
                .map(|b| (b.change.clone(), b.seq))
                .collect();
            captured.sort_by(|(a, sa), (b, sb)| {
                a.priority
                    .cmp(&b.priority)
                    .then(a.timestamp.cmp(&b.timestamp))
                    .then(sa.cmp(sb))
            });
            captured
        };

        if captured.is_empty() {
            return Ok(());
        }

        let batch_size = self.config.batch_size.max(1);
        let mut remaining = captured.as_slice();
        while !remaining.is_empty() {
            let split = remaining.len().min(batch_size);
            let (batch, rest) = remaining.split_at(split);

            let changes: Vec<ProgressChange> =
                batch.iter().map(|(c, _)| c.clone()).collect();
            let snapshot = ChangeSnapshot::from_changes(&changes, Utc::now());

            match self.store.write_snapshot(&snapshot).await {
                Ok(()) => {
                    let mut inner = self.inner.lock().await;
                    for (change, seq) in batch {
                        // Only clear entries that were not re-tracked while
                        // the save was in flight.
                        if inner
                            .changes
                            .get(&change.key)
                            .is_some_and(|b| b.seq == *seq)
                        {
                            inner.changes.remove(&change.key);
                        }
                    }
                }
                Err(error) => {
                    let failed: Vec<(ProgressChange, u64)> =
                        batch.iter().chain(rest.iter()).cloned().collect();
                    self.handle_save_failure(&failed).await;
                    return Err(error);
                }
            }

            remaining = rest;
        }

        {
            let mut inner = self.inner.lock().await;
            inner.last_save = Some(Utc::now());
            inner.retry_attempt = 0;
        }
        if let Err(error) = self.store.prune_snapshots(SNAPSHOT_KEEP_COUNT).await {
            tracing::warn!(%error, "pruning snapshot log failed");
        }

        Ok(())
    }

    /// Observability counters.
    pub async fn stats(&self) -> TrackerStats {
        let inner = self.inner.lock().await;
        TrackerStats {
            is_tracking: inner.is_tracking,
            pending_changes: inner.changes.len(),
            last_save_time: inner.last_save,
            current_phase: self.phase.current(),
            background_task_active: inner.background_task_active,
        }
    }

    /// Stops all timers, detaches the phase watcher, and clears the
    /// buffer. Does not flush; callers needing one must
    /// `save_progress(true)` first.
    pub async fn dispose(&self) {
        {
            let mut tasks = self.tasks.lock().await;
            for handle in [
                tasks.auto_save.take(),
                tasks.critical.take(),
                tasks.retry.take(),
                tasks.phase_watcher.take(),
            ]
            .into_iter()
            .flatten()
            {
                handle.abort();
            }
        }
        let mut inner = self.inner.lock().await;
        inner.changes.clear();
        inner.is_tracking = false;
        inner.disposed = true;
    }

    /// Replays the freshest snapshot record into the buffer as normal
    /// priority entries, then prunes the log regardless of the outcome.
    async fn recover_from_snapshots(&self) {
        match self.store.latest_snapshot().await {
            Ok(Some(snapshot)) => {
                let replayed = snapshot.changes.len();
                let mut inner = self.inner.lock().await;
                for entry in snapshot.changes {
                    inner.next_seq += 1;
                    let seq = inner.next_seq;
                    inner.changes.insert(
                        entry.key.clone(),
                        BufferedChange {
                            change: ProgressChange::new(
                                entry.key,
                                entry.data,
                                ChangePriority::Normal,
                                Utc::now(),
                            ),
                            seq,
                        },
                    );
                }
                drop(inner);
                tracing::info!(replayed, "recovered tracked changes from snapshot log");
            }
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(%error, "reading snapshot log for recovery failed");
            }
        }

        if let Err(error) = self.store.prune_snapshots(SNAPSHOT_KEEP_COUNT).await {
            tracing::warn!(%error, "pruning snapshot log after recovery failed");
        }
    }

    /// Re-buffers failed changes, dropping and reporting the exhausted
    /// ones, and schedules the backoff retry.
    fn handle_save_failure<'a>(
        &'a self,
        failed: &'a [(ProgressChange, u64)],
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
        let (dropped, attempt, disposed) = {
            let mut inner = self.inner.lock().await;
            let mut dropped = Vec::new();
            for (change, seq) in failed {
                let exhausted = match inner.changes.get_mut(&change.key) {
                    // Untouched since capture: count the failed attempt.
                    Some(buffered) if buffered.seq == *seq => {
                        buffered.change.retry_count += 1;
                        buffered.change.retry_count > self.config.max_retry_attempts
                    }
                    // Re-tracked meanwhile or already gone: leave it be.
                    _ => false,
                };
                if exhausted {
                    inner.changes.remove(&change.key);
                    dropped.push(change.key.clone());
                }
            }
            inner.retry_attempt = inner.retry_attempt.saturating_add(1);
            (dropped, inner.retry_attempt, inner.disposed)
        };

        if !dropped.is_empty() {
            for key in &dropped {
                let error = crate::error::SweepError::RetryExhausted { key: key.clone() };
                tracing::warn!(%error, "dropping change");
            }
            self.events
                .emit(&PersistenceEvent::ChangesDropped { keys: dropped });
        }

        if disposed {
            return;
        }

        let has_pending = !self.inner.lock().await.changes.is_empty();
        if !has_pending {
            return;
        }

        let delay = self.config.retry_delay(attempt.saturating_sub(1));
        tracing::debug!(?delay, attempt, "scheduling save retry");
        let tracker = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tracker.save_progress(false).await;
        });
        let mut tasks = self.tasks.lock().await;
        if let Some(previous) = tasks.retry.replace(handle) {
            previous.abort();
        }
        })
    }

    /// Background transition: stop the auto-save cadence and race a
    /// best-effort save against the hard timeout.
    ///
    /// The save task is aborted when the timeout wins; entries it had not
    /// yet confirmed remain buffered, so a late finisher can never clobber
    /// a newer session's state.
    async fn on_background(&self) {
        {
            let mut tasks = self.tasks.lock().await;
            if let Some(handle) = tasks.auto_save.take() {
                handle.abort();
            }
        }
        {
            let mut inner = self.inner.lock().await;
            if inner.disposed {
                return;
            }
            inner.background_task_active = true;
        }

        let hook = self
            .save_hook
            .read()
            .expect("save hook lock poisoned")
            .clone();
        let tracker = self.clone();
        let mut save_task = tokio::spawn(async move {
            if let Some(hook) = hook {
                hook().await;
            }
            if let Err(error) = tracker.save_progress(true).await {
                tracing::warn!(%error, "background save failed");
            }
        });

        let budget = self.config.background_save_timeout;
        match tokio::time::timeout(budget, &mut save_task).await {
            Ok(_) => tracing::debug!("background save settled within budget"),
            Err(_) => {
                save_task.abort();
                tracing::warn!(
                    timeout_ms = budget.as_millis() as u64,
                    "background save exceeded its budget and was aborted"
                );
            }
        }

        self.inner.lock().await.background_task_active = false;
    }

    /// Foreground transition: restart the auto-save cadence if it is not
    /// already running. Does not force a save.
    async fn on_foreground(&self) {
        let should_run = {
            let inner = self.inner.lock().await;
            inner.is_tracking && !inner.disposed && self.config.auto_save_enabled
        };
        if !should_run {
            return;
        }

        let mut tasks = self.tasks.lock().await;
        let running = tasks
            .auto_save
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());
        if !running {
            drop(tasks);
            self.start_auto_save().await;
        }
    }

    /// Spawns the periodic auto-save task.
    async fn start_auto_save(&self) {
        let tracker = self.clone();
        let interval = self.config.auto_save_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(error) = tracker.save_progress(false).await {
                    tracing::warn!(%error, "auto-save tick failed");
                }
            }
        });
        let mut tasks = self.tasks.lock().await;
        if let Some(previous) = tasks.auto_save.replace(handle) {
            previous.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn test_config() -> PersistenceConfig {
        PersistenceConfig {
            auto_save_enabled: false,
            auto_save_interval: Duration::from_secs(30),
            critical_save_delay: Duration::from_millis(100),
            background_save_timeout: Duration::from_secs(10),
            retry_backoff_base: Duration::from_millis(100),
            retry_backoff_cap: Duration::from_secs(5),
            max_retry_attempts: 1,
            batch_size: 50,
            ..PersistenceConfig::default()
        }
    }

    fn tracker_with(
        store: Arc<RecordingStore>,
        config: PersistenceConfig,
    ) -> (ChangeTracker, AppPhaseFeed) {
        let feed = AppPhaseFeed::new();
        let tracker = ChangeTracker::new(store, config, feed.clone());
        (tracker, feed)
    }

    #[tokio::test(start_paused = true)]
    async fn save_is_a_noop_on_empty_buffer() {
        let store = Arc::new(RecordingStore::new());
        let (tracker, _feed) = tracker_with(store.clone(), test_config());

        tracker.save_progress(false).await.unwrap();
        tracker.save_progress(true).await.unwrap();

        assert_eq!(store.snapshot_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn changes_persist_in_priority_then_insertion_order() {
        let store = Arc::new(RecordingStore::new());
        let (tracker, _feed) = tracker_with(store.clone(), test_config());

        tracker
            .track_change("a", json!(1), ChangePriority::Normal)
            .await;
        tracker
            .track_change("b", json!(2), ChangePriority::Critical)
            .await;
        tracker.track_change("c", json!(3), ChangePriority::Low).await;

        tracker.save_progress(false).await.unwrap();

        let snapshots = store.stored_snapshots();
        assert_eq!(snapshots.len(), 1);
        let keys: Vec<&str> = snapshots[0]
            .changes
            .iter()
            .map(|e| e.key.as_str())
            .collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
        assert_eq!(
            snapshots[0].metadata.priorities,
            vec![
                ChangePriority::Critical,
                ChangePriority::Normal,
                ChangePriority::Low
            ]
        );

        // The buffer is cleared and the save time stamped.
        let stats = tracker.stats().await;
        assert_eq!(stats.pending_changes, 0);
        assert!(stats.last_save_time.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn last_write_for_a_key_wins() {
        let store = Arc::new(RecordingStore::new());
        let (tracker, _feed) = tracker_with(store.clone(), test_config());

        tracker
            .track_change("photo-7", json!({"state": "kept"}), ChangePriority::Normal)
            .await;
        tracker
            .track_change(
                "photo-7",
                json!({"state": "deleted"}),
                ChangePriority::Normal,
            )
            .await;

        tracker.save_progress(false).await.unwrap();

        let snapshots = store.stored_snapshots();
        assert_eq!(snapshots[0].changes.len(), 1);
        assert_eq!(snapshots[0].changes[0].data, json!({"state": "deleted"}));
    }

    #[tokio::test(start_paused = true)]
    async fn large_buffers_are_partitioned_into_batches() {
        let store = Arc::new(RecordingStore::new());
        let config = PersistenceConfig {
            batch_size: 10,
            ..test_config()
        };
        let (tracker, _feed) = tracker_with(store.clone(), config);

        for i in 0..25 {
            tracker
                .track_change(format!("key-{i}"), json!(i), ChangePriority::Normal)
                .await;
        }
        tracker.save_progress(false).await.unwrap();

        // 25 changes at batch size 10: three independent snapshot records,
        // pruned afterwards to the keep limit (5), all still present.
        let snapshots = store.stored_snapshots();
        assert_eq!(snapshots.len(), 3);
        let total: usize = snapshots.iter().map(|s| s.changes.len()).sum();
        assert_eq!(total, 25);
    }

    #[tokio::test(start_paused = true)]
    async fn critical_change_saves_on_the_fast_path() {
        let store = Arc::new(RecordingStore::new());
        let (tracker, _feed) = tracker_with(store.clone(), test_config());
        tracker.start().await;

        tracker
            .track_change("undo-stack", json!([1, 2]), ChangePriority::Critical)
            .await;

        // Well before the 30 s auto-save cadence.
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(store.snapshot_calls(), 1);
        assert_eq!(tracker.stats().await.pending_changes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn normal_changes_wait_for_the_auto_save_tick() {
        let store = Arc::new(RecordingStore::new());
        let config = PersistenceConfig {
            auto_save_enabled: true,
            auto_save_interval: Duration::from_secs(30),
            ..test_config()
        };
        let (tracker, _feed) = tracker_with(store.clone(), config);
        tracker.start().await;

        tracker
            .track_change("scroll", json!(120), ChangePriority::Normal)
            .await;

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.snapshot_calls(), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.snapshot_calls(), 1);

        tracker.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn retry_exhaustion_drops_and_reports_once() {
        let store = Arc::new(RecordingStore::new());
        let (tracker, _feed) = tracker_with(store.clone(), test_config());

        let dropped = Arc::new(AtomicUsize::new(0));
        let counter = dropped.clone();
        tracker.events().add_listener(
            "changes_dropped",
            Arc::new(move |event| {
                if let PersistenceEvent::ChangesDropped { keys } = event {
                    counter.fetch_add(keys.len(), Ordering::SeqCst);
                }
            }),
        );

        store.set_fail_snapshots(true);
        tracker
            .track_change("doomed", json!(0), ChangePriority::Normal)
            .await;

        // First failure: retry_count 1, still within max_retry_attempts.
        assert!(tracker.save_progress(false).await.is_err());
        assert_eq!(tracker.stats().await.pending_changes, 1);
        assert_eq!(dropped.load(Ordering::SeqCst), 0);

        // The scheduled retry fails again: retry_count 2 exceeds the limit,
        // the change is dropped and reported.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(tracker.stats().await.pending_changes, 0);
        assert_eq!(dropped.load(Ordering::SeqCst), 1);

        // Nothing left to retry.
        let calls = store.snapshot_calls();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.snapshot_calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_replays_latest_snapshot_as_normal_priority() {
        let store = Arc::new(RecordingStore::new());
        let now = Utc::now();

        let old = ChangeSnapshot::from_changes(
            &[ProgressChange::new(
                "stale",
                json!(1),
                ChangePriority::Low,
                now - chrono::Duration::minutes(10),
            )],
            now - chrono::Duration::minutes(10),
        );
        let fresh = ChangeSnapshot::from_changes(
            &[
                ProgressChange::new("photo-1", json!("kept"), ChangePriority::Critical, now),
                ProgressChange::new("photo-2", json!("deleted"), ChangePriority::Low, now),
            ],
            now,
        );
        store.push_snapshot(old);
        store.push_snapshot(fresh);

        let (tracker, _feed) = tracker_with(store.clone(), test_config());
        tracker.start().await;

        assert_eq!(tracker.stats().await.pending_changes, 2);

        // Replayed entries persist again through the normal path, as
        // normal priority.
        tracker.save_progress(false).await.unwrap();
        let snapshots = store.stored_snapshots();
        let last = snapshots.iter().max_by_key(|s| s.saved_at).unwrap();
        assert!(last
            .metadata
            .priorities
            .iter()
            .all(|p| *p == ChangePriority::Normal));

        tracker.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_log_is_pruned_on_recovery() {
        let store = Arc::new(RecordingStore::new());
        let base = Utc::now();
        for i in 0..8 {
            store.push_snapshot(ChangeSnapshot::from_changes(
                &[],
                base + chrono::Duration::seconds(i),
            ));
        }

        let (tracker, _feed) = tracker_with(store.clone(), test_config());
        tracker.start().await;

        assert_eq!(store.stored_snapshots().len(), SNAPSHOT_KEEP_COUNT);
        tracker.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn background_save_flushes_critical_work() {
        let store = Arc::new(RecordingStore::new());
        let (tracker, feed) = tracker_with(store.clone(), test_config());
        tracker.start().await;

        tracker
            .track_change("undo", json!(1), ChangePriority::Normal)
            .await;

        feed.set_phase(AppPhase::Background);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(store.snapshot_calls() >= 1);
        let stats = tracker.stats().await;
        assert_eq!(stats.pending_changes, 0);
        assert!(!stats.background_task_active);

        tracker.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn background_save_timeout_aborts_without_losing_changes() {
        let store = Arc::new(RecordingStore::new());
        let (tracker, feed) = tracker_with(store.clone(), test_config());
        tracker.start().await;

        tracker
            .track_change("slow", json!(1), ChangePriority::Normal)
            .await;

        store.set_hang_snapshots(true);
        feed.set_phase(AppPhase::Background);

        // Past the 10 s budget; the stalled save was aborted.
        tokio::time::sleep(Duration::from_secs(15)).await;

        let stats = tracker.stats().await;
        assert!(!stats.background_task_active);
        assert_eq!(stats.pending_changes, 1);

        // Back in the foreground the change persists normally.
        store.set_hang_snapshots(false);
        feed.set_phase(AppPhase::Foreground);
        tokio::time::sleep(Duration::from_millis(100)).await;
        tracker.save_progress(false).await.unwrap();
        assert_eq!(tracker.stats().await.pending_changes, 0);

        tracker.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn session_save_hook_runs_inside_the_background_path() {
        let store = Arc::new(RecordingStore::new());
        let (tracker, feed) = tracker_with(store.clone(), test_config());
        tracker.start().await;

        let hook_runs = Arc::new(AtomicUsize::new(0));
        let counter = hook_runs.clone();
        tracker.set_session_save_hook(Arc::new(move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        }));

        feed.set_phase(AppPhase::Background);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(hook_runs.load(Ordering::SeqCst), 1);
        tracker.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_stops_timers_and_clears_the_buffer() {
        let store = Arc::new(RecordingStore::new());
        let config = PersistenceConfig {
            auto_save_enabled: true,
            auto_save_interval: Duration::from_secs(30),
            ..test_config()
        };
        let (tracker, _feed) = tracker_with(store.clone(), config);
        tracker.start().await;

        tracker
            .track_change("pending", json!(1), ChangePriority::Normal)
            .await;
        tracker.dispose().await;

        let stats = tracker.stats().await;
        assert!(!stats.is_tracking);
        assert_eq!(stats.pending_changes, 0);

        // No auto-save fires after dispose.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(store.snapshot_calls(), 0);
    }
}
