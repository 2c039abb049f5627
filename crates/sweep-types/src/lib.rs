//! Shared data model for the sweep session persistence subsystem.
//!
//! This crate contains the "pure" record types that the persistence
//! components operate on: the durable [`SessionRecord`] and its subtrees,
//! the per-category [`CategoryProgress`] entries, the bounded
//! [`NavigationEntry`] history, and the transient [`ProgressChange`] units
//! buffered by the change tracker.
//!
//! Types here are independent of any storage format or component wiring;
//! they only carry the structural invariants that belong to the data itself
//! (history bounds, undo bounds, progress clamping).

mod change;
mod progress;
mod session;

pub use change::{ChangePriority, ChangeSnapshot, ProgressChange, SnapshotEntry, SnapshotMetadata};
pub use progress::{CategoryKind, CategoryProgress, CategoryProgressPatch, NavigationEntry};
pub use session::{
    new_session_id, LifecycleState, NavigationState, ProgressState, SessionMetadata,
    SessionRecord, SessionStats, UndoState, UndoableAction, UserPreferences,
    CURRENT_SCHEMA_VERSION, DEFAULT_MAX_HISTORY_ENTRIES, DEFAULT_MAX_UNDO_ACTIONS,
    SESSION_ID_PREFIX,
};
