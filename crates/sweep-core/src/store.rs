//! Storage adapter contract.
//!
//! [`SessionStore`] is the seam between the in-memory components and the
//! durable medium. The infrastructure crate provides the production
//! implementation; tests plug in counting or failing stubs.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sweep_types::{ChangeSnapshot, SessionMetadata, SessionRecord};

/// Best-effort size introspection of the stored key space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageStats {
    /// Number of stored keys.
    pub entry_count: usize,
    /// Total stored bytes across all keys.
    pub total_bytes: u64,
    /// Bytes of the main session record, if present.
    pub session_bytes: Option<u64>,
    /// When the session was last persisted, if known.
    pub last_saved: Option<DateTime<Utc>>,
}

/// Abstraction over the session storage adapter.
///
/// Everything above the adapter (lifecycle manager, progress cache, change
/// tracker) reads and writes durable state exclusively through this trait.
///
/// # Error policy
///
/// Write-path failures surface to the caller; read-path failures degrade
/// to `Ok(None)` wherever a missing record is an acceptable answer.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persists the record under the well-known main key, together with
    /// its sidecar metadata and (when enabled) a rotating backup copy.
    async fn save(&self, record: &SessionRecord) -> Result<()>;

    /// Coalesces bursts of saves within the throttle window into a single
    /// trailing write carrying the latest record.
    async fn save_throttled(&self, record: &SessionRecord) -> Result<()>;

    /// Loads the main record.
    ///
    /// Returns `Ok(None)` when nothing is stored. A corrupt main record is
    /// recovered from the freshest structurally valid backup slot when
    /// possible, otherwise also reported as `Ok(None)`.
    async fn load(&self) -> Result<Option<SessionRecord>>;

    /// Reads the sidecar metadata without deserializing the full payload.
    async fn metadata(&self) -> Result<Option<SessionMetadata>>;

    /// Cheap pre-check: metadata exists and is within the freshness
    /// window.
    async fn is_session_available(&self) -> Result<bool>;

    /// Removes the main record, its metadata, all backup slots, and all
    /// snapshot records.
    async fn clear(&self) -> Result<()>;

    /// Best-effort size statistics.
    async fn storage_stats(&self) -> Result<StorageStats>;

    /// Whether the medium is below the soft quota.
    async fn has_storage_space(&self) -> Result<bool>;

    /// Appends a snapshot record to the backup log.
    async fn write_snapshot(&self, snapshot: &ChangeSnapshot) -> Result<()>;

    /// Returns the most recent parseable snapshot record, if any.
    async fn latest_snapshot(&self) -> Result<Option<ChangeSnapshot>>;

    /// Prunes the backup log to the `keep` most recent records.
    async fn prune_snapshots(&self, keep: usize) -> Result<()>;
}
