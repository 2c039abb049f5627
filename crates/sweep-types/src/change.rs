//! Transient tracked changes and the backup-log snapshot record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persistence urgency of a tracked change.
///
/// The ordering is the persist order: critical changes are written before
/// normal ones, normal before low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangePriority {
    /// Persisted within a short fixed delay, bypassing the auto-save cadence.
    Critical,
    /// Persisted on the next auto-save tick.
    Normal,
    /// Persisted on the next auto-save tick, after everything else.
    Low,
}

/// One keyed unit of work in the change tracker's buffer.
///
/// Transient and in-memory only; it is never persisted as its own record,
/// only folded into a [`ChangeSnapshot`] or into the session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressChange {
    /// Buffer key; the last write for a key wins.
    pub key: String,
    /// Opaque payload.
    pub data: serde_json::Value,
    /// Persistence urgency.
    pub priority: ChangePriority,
    /// When the change was (last) tracked.
    pub timestamp: DateTime<Utc>,
    /// How many persist attempts have failed for this change.
    pub retry_count: u32,
}

impl ProgressChange {
    /// Creates a change tracked at `timestamp` with no failed attempts.
    pub fn new(
        key: impl Into<String>,
        data: serde_json::Value,
        priority: ChangePriority,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            data,
            priority,
            timestamp,
            retry_count: 0,
        }
    }
}

/// One key/value pair inside a snapshot record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub key: String,
    pub data: serde_json::Value,
}

/// Metadata describing a snapshot record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// Number of changes in the snapshot.
    pub change_count: usize,
    /// Priorities present, in persist order.
    pub priorities: Vec<ChangePriority>,
}

/// One record of the append-style backup log written by the change tracker.
///
/// Distinct from the rotating numbered backup slots of the main session
/// record; the log is pruned to a small number of recent entries and
/// replayed on crash recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSnapshot {
    /// When the snapshot was written.
    pub saved_at: DateTime<Utc>,
    /// The captured key/value pairs, in persist order.
    pub changes: Vec<SnapshotEntry>,
    /// Summary metadata.
    pub metadata: SnapshotMetadata,
}

impl ChangeSnapshot {
    /// Builds a snapshot from an already-sorted batch of changes.
    pub fn from_changes(changes: &[ProgressChange], saved_at: DateTime<Utc>) -> Self {
        Self {
            saved_at,
            changes: changes
                .iter()
                .map(|c| SnapshotEntry {
                    key: c.key.clone(),
                    data: c.data.clone(),
                })
                .collect(),
            metadata: SnapshotMetadata {
                timestamp: saved_at,
                change_count: changes.len(),
                priorities: changes.iter().map(|c| c.priority).collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_persist_order() {
        assert!(ChangePriority::Critical < ChangePriority::Normal);
        assert!(ChangePriority::Normal < ChangePriority::Low);
    }

    #[test]
    fn snapshot_captures_order_and_metadata() {
        let now = Utc::now();
        let changes = vec![
            ProgressChange::new("b", serde_json::json!(2), ChangePriority::Critical, now),
            ProgressChange::new("a", serde_json::json!(1), ChangePriority::Normal, now),
        ];

        let snapshot = ChangeSnapshot::from_changes(&changes, now);

        assert_eq!(snapshot.metadata.change_count, 2);
        assert_eq!(snapshot.changes[0].key, "b");
        assert_eq!(
            snapshot.metadata.priorities,
            vec![ChangePriority::Critical, ChangePriority::Normal]
        );
    }
}
