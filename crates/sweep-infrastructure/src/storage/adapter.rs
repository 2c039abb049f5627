//! The storage adapter: the only component that talks to the durable
//! key-value media.
//!
//! Responsibilities: record serialization, secure-store routing with
//! read-side fallback, rotating backup slots, write throttling, the
//! snapshot backup log, size statistics, and save/load events.
//!
//! # Key space
//!
//! ```text
//! session                      main record payload
//! session_meta                 sidecar metadata blob
//! backup_0 .. backup_{N-1}     rotating full-record backups
//! snapshot_<nanos>             change tracker backup log, pruned
//! ```

use super::medium::StorageMedium;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use sweep_core::config::PersistenceConfig;
use sweep_core::error::Result;
use sweep_core::events::{EventBus, PersistenceEvent};
use sweep_core::store::{SessionStore, StorageStats};
use sweep_types::{ChangeSnapshot, SessionMetadata, SessionRecord, UndoState, UserPreferences};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const SESSION_KEY: &str = "session";
const METADATA_KEY: &str = "session_meta";
const BACKUP_PREFIX: &str = "backup_";
const SNAPSHOT_PREFIX: &str = "snapshot_";

/// Soft quota used by `has_storage_space`; crossing it is a UI warning,
/// not a hard failure.
const SOFT_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Default)]
struct ThrottleState {
    pending: Option<SessionRecord>,
    task: Option<JoinHandle<()>>,
}

/// Production [`SessionStore`] over one or two [`StorageMedium`]s.
///
/// Writes route to the secure medium when encryption is enabled and one is
/// configured; a secure **write** failure surfaces to the caller, while a
/// secure **read** failure falls back to the plain medium transparently.
/// Metadata, backups, and snapshots always live on the plain medium.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct StorageAdapter {
    plain: Arc<dyn StorageMedium>,
    secure: Option<Arc<dyn StorageMedium>>,
    config: Arc<PersistenceConfig>,
    events: EventBus,
    backup_cursor: Arc<Mutex<Option<usize>>>,
    throttle: Arc<Mutex<ThrottleState>>,
}

impl StorageAdapter {
    /// Creates an adapter over a single plain medium.
    pub fn new(plain: Arc<dyn StorageMedium>, config: PersistenceConfig) -> Self {
        Self {
            plain,
            secure: None,
            config: Arc::new(config),
            events: EventBus::new(),
            backup_cursor: Arc::new(Mutex::new(None)),
            throttle: Arc::new(Mutex::new(ThrottleState::default())),
        }
    }

    /// Attaches the secure medium used when encryption is enabled.
    #[must_use]
    pub fn with_secure_medium(mut self, secure: Arc<dyn StorageMedium>) -> Self {
        self.secure = Some(secure);
        self
    }

    /// Listener registry for adapter events (`session_saved`,
    /// `session_loaded`, `session_cleared`).
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn secure_routing(&self) -> Option<&Arc<dyn StorageMedium>> {
        if self.config.enable_encryption {
            self.secure.as_ref()
        } else {
            None
        }
    }

    /// Strips privacy-excluded subtrees before serialization.
    fn apply_privacy(&self, record: &SessionRecord) -> SessionRecord {
        let mut record = record.clone();
        if !self.config.persist_user_preferences {
            record.user_preferences = UserPreferences::default();
        }
        if !self.config.persist_undo_stack {
            let max = record.undo_state.max_undo_actions;
            record.undo_state = UndoState {
                max_undo_actions: max,
                ..UndoState::default()
            };
        }
        record
    }

    /// The actual save path shared by `save` and the throttle timer.
    async fn save_record(&self, record: &SessionRecord) -> Result<()> {
        let stripped = self.apply_privacy(record);
        let payload = serde_json::to_vec(&stripped)?;

        // Secure write failures must surface: silently writing the plain
        // copy instead would let the two stores diverge.
        let encrypted = match self.secure_routing() {
            Some(secure) => {
                secure.write(SESSION_KEY, &payload).await?;
                true
            }
            None => {
                self.plain.write(SESSION_KEY, &payload).await?;
                false
            }
        };

        let metadata = SessionMetadata::for_record(&stripped, encrypted);
        self.plain
            .write(METADATA_KEY, &serde_json::to_vec(&metadata)?)
            .await?;

        if self.config.enable_backup && self.config.max_backups > 0 {
            let slot = self.next_backup_slot().await;
            self.plain
                .write(&format!("{BACKUP_PREFIX}{slot}"), &payload)
                .await?;
        }

        tracing::debug!(session_id = %stripped.session_id, "session saved");
        self.events.emit(&PersistenceEvent::SessionSaved {
            session_id: stripped.session_id,
            timestamp: stripped.last_saved,
        });
        Ok(())
    }

    /// Next rotating backup slot, cycling `0..max_backups`.
    ///
    /// The cursor is derived lazily from the freshest existing backup so
    /// rotation continues across process restarts.
    async fn next_backup_slot(&self) -> usize {
        let max = self.config.max_backups;
        let mut cursor = self.backup_cursor.lock().await;
        let slot = match *cursor {
            Some(slot) => slot,
            None => {
                let mut newest: Option<(usize, chrono::DateTime<Utc>)> = None;
                for candidate in 0..max {
                    let key = format!("{BACKUP_PREFIX}{candidate}");
                    if let Ok(Some(bytes)) = self.plain.read(&key).await {
                        if let Ok(record) = serde_json::from_slice::<SessionRecord>(&bytes) {
                            let fresher = newest
                                .map(|(_, saved)| record.last_saved > saved)
                                .unwrap_or(true);
                            if fresher {
                                newest = Some((candidate, record.last_saved));
                            }
                        }
                    }
                }
                newest.map(|(slot, _)| (slot + 1) % max).unwrap_or(0)
            }
        };
        *cursor = Some((slot + 1) % max);
        slot
    }

    /// Reads the main payload, falling back from the secure medium to the
    /// plain one on read failures or absence.
    async fn read_main_payload(&self) -> Result<Option<Vec<u8>>> {
        if let Some(secure) = self.secure_routing() {
            match secure.read(SESSION_KEY).await {
                Ok(Some(bytes)) => return Ok(Some(bytes)),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(%error, "secure store read failed; falling back to plain");
                }
            }
        }
        self.plain.read(SESSION_KEY).await
    }

    /// Best-effort recovery: the freshest structurally valid backup slot.
    async fn recover_from_backups(&self) -> Option<SessionRecord> {
        if !self.config.enable_backup {
            return None;
        }
        let mut best: Option<SessionRecord> = None;
        for slot in 0..self.config.max_backups {
            let key = format!("{BACKUP_PREFIX}{slot}");
            let Ok(Some(bytes)) = self.plain.read(&key).await else {
                continue;
            };
            let Ok(record) = serde_json::from_slice::<SessionRecord>(&bytes) else {
                continue;
            };
            if record.session_id.is_empty() || record.version.is_empty() {
                continue;
            }
            let fresher = best
                .as_ref()
                .map(|b| record.last_saved > b.last_saved)
                .unwrap_or(true);
            if fresher {
                best = Some(record);
            }
        }
        if let Some(record) = &best {
            tracing::info!(session_id = %record.session_id, "session recovered from backup slot");
        }
        best
    }

    /// Snapshot keys, newest first. Zero-padded timestamps make the
    /// lexicographic order chronological.
    async fn snapshot_keys_desc(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .plain
            .keys()
            .await?
            .into_iter()
            .filter(|k| k.starts_with(SNAPSHOT_PREFIX))
            .collect();
        keys.sort_by(|a, b| b.cmp(a));
        Ok(keys)
    }
}

#[async_trait]
impl SessionStore for StorageAdapter {
    async fn save(&self, record: &SessionRecord) -> Result<()> {
        self.save_record(record).await
    }

    async fn save_throttled(&self, record: &SessionRecord) -> Result<()> {
        let mut throttle = self.throttle.lock().await;
        throttle.pending = Some(record.clone());

        let armed = throttle
            .task
            .as_ref()
            .is_some_and(|task| !task.is_finished());
        if !armed {
            let adapter = self.clone();
            let delay = self.config.throttle_delay;
            throttle.task = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let pending = adapter.throttle.lock().await.pending.take();
                if let Some(record) = pending {
                    if let Err(error) = adapter.save_record(&record).await {
                        tracing::warn!(%error, "throttled save failed");
                    }
                }
            }));
        }
        Ok(())
    }

    async fn load(&self) -> Result<Option<SessionRecord>> {
        let Some(bytes) = self.read_main_payload().await? else {
            return Ok(None);
        };

        let record = match serde_json::from_slice::<SessionRecord>(&bytes) {
            Ok(record) => Some(record),
            Err(error) => {
                tracing::warn!(%error, "main session record is corrupt; trying backups");
                self.recover_from_backups().await
            }
        };

        if let Some(record) = &record {
            self.events.emit(&PersistenceEvent::SessionLoaded {
                session_id: record.session_id.clone(),
                timestamp: Utc::now(),
            });
        }
        Ok(record)
    }

    async fn metadata(&self) -> Result<Option<SessionMetadata>> {
        let Some(bytes) = self.plain.read(METADATA_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(error) => {
                tracing::warn!(%error, "session metadata is corrupt");
                Ok(None)
            }
        }
    }

    async fn is_session_available(&self) -> Result<bool> {
        let Some(metadata) = self.metadata().await? else {
            return Ok(false);
        };
        Ok(Utc::now() - metadata.last_saved <= self.config.session_expiry())
    }

    async fn clear(&self) -> Result<()> {
        if let Some(secure) = &self.secure {
            if let Err(error) = secure.remove(SESSION_KEY).await {
                tracing::warn!(%error, "clearing secure store failed");
            }
        }
        self.plain.remove(SESSION_KEY).await?;
        self.plain.remove(METADATA_KEY).await?;
        for slot in 0..self.config.max_backups {
            self.plain.remove(&format!("{BACKUP_PREFIX}{slot}")).await?;
        }
        for key in self.snapshot_keys_desc().await? {
            self.plain.remove(&key).await?;
        }

        *self.backup_cursor.lock().await = None;
        self.throttle.lock().await.pending = None;

        self.events.emit(&PersistenceEvent::SessionCleared);
        Ok(())
    }

    async fn storage_stats(&self) -> Result<StorageStats> {
        let keys = self.plain.keys().await?;
        let mut total_bytes = 0u64;
        for key in &keys {
            if let Some(len) = self.plain.len_of(key).await? {
                total_bytes += len;
            }
        }

        let session_bytes = match self.secure_routing() {
            Some(secure) => secure.len_of(SESSION_KEY).await.unwrap_or(None),
            None => self.plain.len_of(SESSION_KEY).await?,
        };

        Ok(StorageStats {
            entry_count: keys.len(),
            total_bytes,
            session_bytes,
            last_saved: self.metadata().await?.map(|m| m.last_saved),
        })
    }

    async fn has_storage_space(&self) -> Result<bool> {
        Ok(self.storage_stats().await?.total_bytes < SOFT_QUOTA_BYTES)
    }

    async fn write_snapshot(&self, snapshot: &ChangeSnapshot) -> Result<()> {
        let nanos = snapshot
            .saved_at
            .timestamp_nanos_opt()
            .unwrap_or_else(|| snapshot.saved_at.timestamp_millis() * 1_000_000);
        let key = format!("{SNAPSHOT_PREFIX}{nanos:020}");
        self.plain
            .write(&key, &serde_json::to_vec(snapshot)?)
            .await
    }

    async fn latest_snapshot(&self) -> Result<Option<ChangeSnapshot>> {
        for key in self.snapshot_keys_desc().await? {
            let Some(bytes) = self.plain.read(&key).await? else {
                continue;
            };
            match serde_json::from_slice(&bytes) {
                Ok(snapshot) => return Ok(Some(snapshot)),
                Err(error) => {
                    tracing::warn!(key = %key, %error, "skipping corrupt snapshot record");
                }
            }
        }
        Ok(None)
    }

    async fn prune_snapshots(&self, keep: usize) -> Result<()> {
        let keys = self.snapshot_keys_desc().await?;
        for key in keys.iter().skip(keep) {
            self.plain.remove(key).await?;
        }
        Ok(())
    }
}
