//! Session lifecycle management.
//!
//! The lifecycle manager owns the single authoritative in-memory
//! [`SessionRecord`], mediates pause/resume transitions tied to the
//! application phase feed, validates loaded records before trusting them,
//! and exposes the session to the rest of the application.
//!
//! # Error policy
//!
//! `update_session` and `save_session` are explicit operations and
//! propagate failures. `pause`, `resume`, and `dispose` run on OS-driven
//! transitions the caller cannot retry; they log failures and fall back to
//! a safe state instead of returning errors.

use crate::cache::CategoryProgressCache;
use crate::config::PersistenceConfig;
use crate::error::{Result, SweepError};
use crate::events::{EventBus, EventListener, ListenerId, PersistenceEvent};
use crate::phase::AppPhaseFeed;
use crate::session::patch::SessionPatch;
use crate::session::validation::{validate_session, ValidationReport};
use crate::store::SessionStore;
use chrono::Utc;
use std::sync::Arc;
use sweep_types::SessionRecord;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

/// Where the manager is in its own life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManagerPhase {
    Uninitialized,
    Initializing,
    Ready,
    Disposed,
}

struct ManagerInner {
    phase: ManagerPhase,
    record: Option<SessionRecord>,
}

/// Owner of the live session record.
///
/// Cheap to clone; clones share state. Requires a running Tokio runtime
/// (the app-phase watcher is spawned during `initialize`).
#[derive(Clone)]
pub struct SessionLifecycleManager {
    store: Arc<dyn SessionStore>,
    cache: CategoryProgressCache,
    config: Arc<PersistenceConfig>,
    phase_feed: AppPhaseFeed,
    events: EventBus,
    inner: Arc<RwLock<ManagerInner>>,
    watcher: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SessionLifecycleManager {
    /// Creates the manager. Nothing is loaded until `initialize`.
    pub fn new(
        store: Arc<dyn SessionStore>,
        cache: CategoryProgressCache,
        config: PersistenceConfig,
        phase_feed: AppPhaseFeed,
    ) -> Self {
        Self {
            store,
            cache,
            config: Arc::new(config),
            phase_feed,
            events: EventBus::new(),
            inner: Arc::new(RwLock::new(ManagerInner {
                phase: ManagerPhase::Uninitialized,
                record: None,
            })),
            watcher: Arc::new(Mutex::new(None)),
        }
    }

    /// Loads and adopts the stored session, or synthesizes a fresh one.
    ///
    /// Idempotent: a second call while already initialized returns the
    /// existing record. Load failures, parse failures, and validation
    /// rejections never fail this call; they all fall back to a brand-new
    /// record so the application always makes forward progress.
    pub async fn initialize(&self) -> Result<SessionRecord> {
        {
            let mut inner = self.inner.write().await;
            match inner.phase {
                ManagerPhase::Ready => {
                    return Ok(inner.record.clone().expect("ready without record"));
                }
                ManagerPhase::Disposed => return Err(SweepError::NoActiveSession),
                ManagerPhase::Initializing => {
                    return Err(SweepError::internal("initialize re-entered"));
                }
                ManagerPhase::Uninitialized => inner.phase = ManagerPhase::Initializing,
            }
        }

        let now = Utc::now();
        let record = match self.store.load().await {
            Ok(Some(stored)) => {
                let report = validate_session(&stored, &self.config, now);
                for warning in &report.warnings {
                    tracing::warn!(%warning, "stored session warning");
                }
                if report.can_restore {
                    if !report.is_valid {
                        tracing::warn!("restoring a stale session record");
                    }
                    self.events.emit(&PersistenceEvent::SessionLoaded {
                        session_id: stored.session_id.clone(),
                        timestamp: now,
                    });
                    let mut adopted = stored;
                    adopted.lifecycle.is_active = true;
                    adopted.lifecycle.is_paused = false;
                    adopted
                } else {
                    tracing::warn!(
                        errors = ?report.errors,
                        "stored session rejected; starting fresh"
                    );
                    self.fresh_record(Some(&self.store), false).await
                }
            }
            Ok(None) => self.fresh_record(None, false).await,
            Err(error) => {
                tracing::warn!(%error, "loading stored session failed; starting fresh");
                self.fresh_record(None, true).await
            }
        };

        // Best-effort initial persist so availability checks and subtree
        // merges have a record to work against.
        if let Err(error) = self.store.save(&record).await {
            tracing::warn!(%error, "initial session persist failed");
        }

        self.cache.prime().await;

        {
            let mut inner = self.inner.write().await;
            inner.record = Some(record.clone());
            inner.phase = ManagerPhase::Ready;
        }

        self.spawn_phase_watcher().await;

        Ok(record)
    }

    /// Shallow-merges a patch into the current record and stamps
    /// `last_saved`.
    pub async fn update_session(&self, patch: SessionPatch) -> Result<SessionRecord> {
        let mut inner = self.inner.write().await;
        let record = match (inner.phase, inner.record.as_mut()) {
            (ManagerPhase::Ready, Some(record)) => record,
            _ => return Err(SweepError::NoActiveSession),
        };

        patch.apply(record);
        record.last_saved = Utc::now();
        Ok(record.clone())
    }

    /// Persists the current record, propagating storage errors.
    pub async fn save_session(&self) -> Result<()> {
        let mut record = {
            let inner = self.inner.read().await;
            match (inner.phase, inner.record.clone()) {
                (ManagerPhase::Ready, Some(record)) => record,
                _ => return Err(SweepError::NoActiveSession),
            }
        };

        record.last_saved = Utc::now();
        self.overlay_cache_subtrees(&mut record).await;
        self.store.save(&record).await?;

        {
            let mut inner = self.inner.write().await;
            if let Some(current) = inner.record.as_mut() {
                current.last_saved = record.last_saved;
            }
        }

        self.events.emit(&PersistenceEvent::SessionSaved {
            session_id: record.session_id,
            timestamp: record.last_saved,
        });
        Ok(())
    }

    /// Pauses the session on a background transition.
    ///
    /// Idempotent: pausing an already-paused session changes nothing and
    /// does not re-stamp `paused_at`. Never returns an error; persistence
    /// failures are logged.
    pub async fn pause(&self) {
        let mut to_save = {
            let mut inner = self.inner.write().await;
            let record = match (inner.phase, inner.record.as_mut()) {
                (ManagerPhase::Ready, Some(record)) => record,
                _ => return,
            };
            if record.lifecycle.is_paused {
                return;
            }

            record.lifecycle.is_paused = true;
            record.lifecycle.is_active = false;
            record.lifecycle.paused_at = Some(Utc::now());
            record.lifecycle.pause_count += 1;
            record.last_saved = Utc::now();
            record.clone()
        };

        self.overlay_cache_subtrees(&mut to_save).await;
        if let Err(error) = self.store.save(&to_save).await {
            tracing::warn!(%error, "saving session on pause failed");
        }
        if let Err(error) = self.cache.flush_pending_writes().await {
            tracing::warn!(%error, "flushing progress cache on pause failed");
        }

        self.events.emit(&PersistenceEvent::SessionPaused {
            session_id: to_save.session_id,
        });
    }

    /// Resumes the session on a foreground transition.
    ///
    /// Computes the background stay; too long a stay, a failed reload, or
    /// a non-restorable reloaded record all discard the current record in
    /// favor of a fresh one. Never returns an error.
    pub async fn resume(&self) {
        let now = Utc::now();
        let (paused_at, current) = {
            let inner = self.inner.read().await;
            let record = match (inner.phase, inner.record.as_ref()) {
                (ManagerPhase::Ready, Some(record)) => record,
                _ => return,
            };
            if !record.lifecycle.is_paused {
                return;
            }
            (record.lifecycle.paused_at, record.clone())
        };

        let background = paused_at
            .map(|t| (now - t).to_std().unwrap_or_default())
            .unwrap_or_default();

        let resumed = if background > self.config.max_background_time {
            tracing::info!(
                background_ms = background.as_millis() as u64,
                "background stay exceeded the limit; starting fresh"
            );
            self.fresh_record(Some(&self.store), false).await
        } else {
            match self.store.load().await {
                Ok(Some(stored)) => {
                    let report = validate_session(&stored, &self.config, now);
                    if report.can_restore {
                        let mut record = stored;
                        record.lifecycle.is_active = true;
                        record.lifecycle.is_paused = false;
                        record.lifecycle.resumed_at = Some(now);
                        record.lifecycle.background_duration_ms =
                            background.as_millis() as u64;
                        record.lifecycle.total_pause_time_ms +=
                            background.as_millis() as u64;
                        record
                    } else {
                        tracing::warn!(
                            errors = ?report.errors,
                            "reloaded session rejected on resume; starting fresh"
                        );
                        self.fresh_record(Some(&self.store), false).await
                    }
                }
                Ok(None) => {
                    // Nothing stored (cleared while backgrounded); carry on
                    // with the in-memory record.
                    let mut record = current;
                    record.lifecycle.is_active = true;
                    record.lifecycle.is_paused = false;
                    record.lifecycle.resumed_at = Some(now);
                    record.lifecycle.background_duration_ms = background.as_millis() as u64;
                    record.lifecycle.total_pause_time_ms += background.as_millis() as u64;
                    record
                }
                Err(error) => {
                    tracing::warn!(%error, "reloading session on resume failed; starting fresh");
                    self.fresh_record(None, true).await
                }
            }
        };

        let session_id = resumed.session_id.clone();
        // The adopted record may differ from what the cache was primed
        // with (fresh session, reloaded state); realign the cache.
        self.cache.reload_from(&resumed).await;
        {
            let mut inner = self.inner.write().await;
            if inner.phase == ManagerPhase::Ready {
                inner.record = Some(resumed);
            }
        }

        self.events
            .emit(&PersistenceEvent::SessionResumed { session_id });
    }

    /// Validates a record against the configured policy.
    pub fn validate_session(&self, record: &SessionRecord) -> ValidationReport {
        validate_session(record, &self.config, Utc::now())
    }

    /// Clone of the live record, if initialized.
    pub async fn get_current_session(&self) -> Option<SessionRecord> {
        self.inner.read().await.record.clone()
    }

    /// Registers a listener for a manager event name.
    pub fn add_event_listener(&self, event: &str, listener: EventListener) -> ListenerId {
        self.events.add_listener(event, listener)
    }

    /// Removes a previously registered listener.
    pub fn remove_event_listener(&self, id: ListenerId) {
        self.events.remove_listener(id)
    }

    /// Detaches the phase watcher, disposes the cache (which flushes),
    /// and best-effort persists the record before releasing it.
    pub async fn dispose(&self) {
        {
            let inner = self.inner.read().await;
            if inner.phase == ManagerPhase::Disposed {
                return;
            }
        }

        if let Some(handle) = self.watcher.lock().await.take() {
            handle.abort();
        }

        self.cache.dispose().await;

        let final_record = {
            let mut inner = self.inner.write().await;
            inner.phase = ManagerPhase::Disposed;
            inner.record.take()
        };

        if let Some(mut record) = final_record {
            let now = Utc::now();
            record.metadata.last_session_duration_ms = (now
                - record.progress.session_start_time)
                .to_std()
                .unwrap_or_default()
                .as_millis() as u64;
            record.lifecycle.is_active = false;
            record.last_saved = now;
            self.overlay_cache_subtrees(&mut record).await;
            if let Err(error) = self.store.save(&record).await {
                tracing::warn!(%error, "final session persist on dispose failed");
            }
        }
    }

    /// Overlays the cache-owned subtrees onto a record about to be saved.
    ///
    /// The progress cache is the authoritative owner of `category_memory`
    /// and `navigation_history` once primed; without this, a whole-record
    /// save from the manager could clobber progress the cache has flushed
    /// since this record was last refreshed.
    async fn overlay_cache_subtrees(&self, record: &mut SessionRecord) {
        record.progress.category_memory = self.cache.category_snapshot().await;
        record.progress.navigation_history = self.cache.get_navigation_history().await;
    }

    /// Builds a fresh record, carrying cross-session stats forward when a
    /// previous record is still readable.
    async fn fresh_record(
        &self,
        carry_from_store: Option<&Arc<dyn SessionStore>>,
        crashed: bool,
    ) -> SessionRecord {
        let now = Utc::now();
        let mut record = SessionRecord::fresh(now);
        record.progress.max_history_entries = self.config.max_history_entries;

        if let Some(store) = carry_from_store {
            if let Ok(Some(previous)) = store.load().await {
                record.metadata = previous.metadata;
            }
        }
        record.metadata.total_sessions += 1;
        if crashed {
            record.metadata.crash_recovery_attempts += 1;
            record.metadata.last_crash_time = Some(now);
        }

        record
    }

    /// Maps app phase transitions onto pause/resume.
    async fn spawn_phase_watcher(&self) {
        let manager = self.clone();
        let mut rx = self.phase_feed.subscribe();
        let handle = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let phase = *rx.borrow_and_update();
                if phase.is_backgrounded() {
                    manager.pause().await;
                } else {
                    manager.resume().await;
                }
            }
        });
        if let Some(previous) = self.watcher.lock().await.replace(handle) {
            previous.abort();
        }
    }
}
