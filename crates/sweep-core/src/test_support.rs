//! In-memory [`SessionStore`] stub shared by the component tests.
//!
//! Counts calls and supports failure injection so tests can assert
//! coalescing, retry, and fallback behavior without a real medium.

use crate::error::{Result, SweepError};
use crate::store::{SessionStore, StorageStats};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use sweep_types::{ChangeSnapshot, SessionMetadata, SessionRecord};

#[derive(Default)]
struct StubState {
    record: Option<SessionRecord>,
    snapshots: Vec<ChangeSnapshot>,
    save_calls: usize,
    snapshot_calls: usize,
    fail_saves: bool,
    fail_loads: bool,
    fail_snapshots: bool,
    hang_snapshots: bool,
}

/// Recording in-memory store.
#[derive(Default)]
pub(crate) struct RecordingStore {
    state: Mutex<StubState>,
}

impl RecordingStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_record(record: SessionRecord) -> Self {
        let store = Self::new();
        store.state.lock().unwrap().record = Some(record);
        store
    }

    pub(crate) fn save_calls(&self) -> usize {
        self.state.lock().unwrap().save_calls
    }

    pub(crate) fn snapshot_calls(&self) -> usize {
        self.state.lock().unwrap().snapshot_calls
    }

    pub(crate) fn stored_record(&self) -> Option<SessionRecord> {
        self.state.lock().unwrap().record.clone()
    }

    pub(crate) fn stored_snapshots(&self) -> Vec<ChangeSnapshot> {
        self.state.lock().unwrap().snapshots.clone()
    }

    pub(crate) fn push_snapshot(&self, snapshot: ChangeSnapshot) {
        self.state.lock().unwrap().snapshots.push(snapshot);
    }

    pub(crate) fn set_fail_saves(&self, fail: bool) {
        self.state.lock().unwrap().fail_saves = fail;
    }

    pub(crate) fn set_fail_loads(&self, fail: bool) {
        self.state.lock().unwrap().fail_loads = fail;
    }

    pub(crate) fn set_fail_snapshots(&self, fail: bool) {
        self.state.lock().unwrap().fail_snapshots = fail;
    }

    pub(crate) fn set_hang_snapshots(&self, hang: bool) {
        self.state.lock().unwrap().hang_snapshots = hang;
    }
}

#[async_trait]
impl SessionStore for RecordingStore {
    async fn save(&self, record: &SessionRecord) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.save_calls += 1;
        if state.fail_saves {
            return Err(SweepError::storage_unavailable("injected save failure"));
        }
        state.record = Some(record.clone());
        Ok(())
    }

    async fn save_throttled(&self, record: &SessionRecord) -> Result<()> {
        self.save(record).await
    }

    async fn load(&self) -> Result<Option<SessionRecord>> {
        let state = self.state.lock().unwrap();
        if state.fail_loads {
            return Err(SweepError::storage_unavailable("injected load failure"));
        }
        Ok(state.record.clone())
    }

    async fn metadata(&self) -> Result<Option<SessionMetadata>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .record
            .as_ref()
            .map(|r| SessionMetadata::for_record(r, false)))
    }

    async fn is_session_available(&self) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state
            .record
            .as_ref()
            .map(|r| Utc::now() - r.last_saved < chrono::Duration::hours(24))
            .unwrap_or(false))
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record = None;
        state.snapshots.clear();
        Ok(())
    }

    async fn storage_stats(&self) -> Result<StorageStats> {
        let state = self.state.lock().unwrap();
        Ok(StorageStats {
            entry_count: usize::from(state.record.is_some()) + state.snapshots.len(),
            total_bytes: 0,
            session_bytes: None,
            last_saved: state.record.as_ref().map(|r| r.last_saved),
        })
    }

    async fn has_storage_space(&self) -> Result<bool> {
        Ok(true)
    }

    async fn write_snapshot(&self, snapshot: &ChangeSnapshot) -> Result<()> {
        let hang = {
            let mut state = self.state.lock().unwrap();
            state.snapshot_calls += 1;
            state.hang_snapshots
        };
        if hang {
            // Simulates a stalled medium; callers racing a timeout win.
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        }
        let mut state = self.state.lock().unwrap();
        if state.fail_snapshots {
            return Err(SweepError::storage_unavailable("injected snapshot failure"));
        }
        state.snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn latest_snapshot(&self) -> Result<Option<ChangeSnapshot>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .snapshots
            .iter()
            .max_by_key(|s| s.saved_at)
            .cloned())
    }

    async fn prune_snapshots(&self, keep: usize) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.snapshots.sort_by_key(|s| std::cmp::Reverse(s.saved_at));
        state.snapshots.truncate(keep);
        Ok(())
    }
}
