//! The durable session record and its subtrees.
//!
//! [`SessionRecord`] is the single root object persisted by the storage
//! adapter. The lifecycle manager owns the one live instance; everything
//! else works on clones or on disjoint subtrees of it.

use crate::progress::{CategoryKind, CategoryProgress, NavigationEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Schema version written into every persisted record.
///
/// Loaded records carrying a different version are handled by validation,
/// not by silent coercion.
pub const CURRENT_SCHEMA_VERSION: &str = "1.2.0";

/// Prefix of every generated session identifier.
pub const SESSION_ID_PREFIX: &str = "session_";

/// Default bound for the navigation history list.
pub const DEFAULT_MAX_HISTORY_ENTRIES: usize = 50;

/// Default bound for the undo stack.
pub const DEFAULT_MAX_UNDO_ACTIONS: usize = 20;

/// Generates a fresh, unique session identifier.
pub fn new_session_id() -> String {
    format!("{}{}", SESSION_ID_PREFIX, uuid::Uuid::new_v4())
}

/// UI-resumption state: where the user was when the session was persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationState {
    /// Route name of the screen to restore.
    pub current_screen: String,
    /// Index of the photo the user was looking at.
    pub current_photo_index: usize,
    /// Selected category, if the user was inside one.
    pub selected_category_id: Option<String>,
    /// Kind of the selected category.
    pub selected_category_type: Option<CategoryKind>,
    /// Scroll offset of the active list, in points.
    pub scroll_position: f64,
}

impl Default for NavigationState {
    fn default() -> Self {
        Self {
            current_screen: "main".to_string(),
            current_photo_index: 0,
            selected_category_id: None,
            selected_category_type: None,
            scroll_position: 0.0,
        }
    }
}

/// Triage progress: completed categories, per-category memory, and the
/// bounded navigation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    /// When this session started.
    pub session_start_time: DateTime<Utc>,
    /// Category IDs the user has fully triaged.
    #[serde(default)]
    pub categories_completed: BTreeSet<String>,
    /// Total photos processed in this session.
    #[serde(default)]
    pub photos_processed: u32,
    /// Total photos in the collection at session start.
    #[serde(default)]
    pub total_photos: u32,
    /// Per-category progress, keyed by category ID.
    #[serde(default)]
    pub category_memory: HashMap<String, CategoryProgress>,
    /// Navigation history, newest first.
    #[serde(default)]
    pub navigation_history: Vec<NavigationEntry>,
    /// Bound on `navigation_history`; oldest entries are dropped silently.
    #[serde(default = "default_max_history_entries")]
    pub max_history_entries: usize,
}

fn default_max_history_entries() -> usize {
    DEFAULT_MAX_HISTORY_ENTRIES
}

impl ProgressState {
    /// Creates empty progress for a session started at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            session_start_time: now,
            categories_completed: BTreeSet::new(),
            photos_processed: 0,
            total_photos: 0,
            category_memory: HashMap::new(),
            navigation_history: Vec::new(),
            max_history_entries: DEFAULT_MAX_HISTORY_ENTRIES,
        }
    }

    /// Pushes a navigation entry to the front of the history.
    ///
    /// The list stays newest-first and never exceeds `max_history_entries`;
    /// overflowing entries are dropped from the tail.
    pub fn push_history(&mut self, entry: NavigationEntry) {
        self.navigation_history.insert(0, entry);
        self.navigation_history.truncate(self.max_history_entries);
    }
}

/// Opaque user preferences, persisted pass-through.
///
/// The persistence subsystem never interprets these beyond carrying them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserPreferences(pub serde_json::Map<String, serde_json::Value>);

/// One reversible triage action on the undo stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoableAction {
    /// What the user did ("delete", "keep", ...).
    pub action_type: String,
    /// Photo the action applied to.
    pub photo_id: String,
    /// Category the photo belonged to, if any.
    pub category_id: Option<String>,
    /// When the action happened.
    pub timestamp: DateTime<Utc>,
}

/// Bounded undo stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoState {
    /// Actions, oldest first; bounded by `max_undo_actions`.
    #[serde(default)]
    pub undo_stack: Vec<UndoableAction>,
    /// Bound on `undo_stack`.
    #[serde(default = "default_max_undo_actions")]
    pub max_undo_actions: usize,
    /// When the user last undid an action.
    pub last_undo_timestamp: Option<DateTime<Utc>>,
}

fn default_max_undo_actions() -> usize {
    DEFAULT_MAX_UNDO_ACTIONS
}

impl Default for UndoState {
    fn default() -> Self {
        Self {
            undo_stack: Vec::new(),
            max_undo_actions: DEFAULT_MAX_UNDO_ACTIONS,
            last_undo_timestamp: None,
        }
    }
}

impl UndoState {
    /// Pushes an action, dropping the oldest entries past the bound.
    pub fn push(&mut self, action: UndoableAction) {
        self.undo_stack.push(action);
        if self.undo_stack.len() > self.max_undo_actions {
            let excess = self.undo_stack.len() - self.max_undo_actions;
            self.undo_stack.drain(..excess);
        }
    }
}

/// Cross-session bookkeeping carried on the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// How many sessions this install has seen.
    pub total_sessions: u32,
    /// Duration of the previous session, in milliseconds.
    pub last_session_duration_ms: u64,
    /// How many times crash recovery has run.
    pub crash_recovery_attempts: u32,
    /// When the last crash (failed restore) was detected.
    pub last_crash_time: Option<DateTime<Utc>>,
}

/// Foreground/background lifecycle flags.
///
/// Serialized with the record, but not trusted verbatim across process
/// restarts: the lifecycle manager rehydrates the flags on resume and
/// re-derives the durations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifecycleState {
    /// Whether the session is in the foreground and usable.
    pub is_active: bool,
    /// Whether the session is paused (backgrounded).
    pub is_paused: bool,
    /// When the session was last paused.
    pub paused_at: Option<DateTime<Utc>>,
    /// When the session was last resumed.
    pub resumed_at: Option<DateTime<Utc>>,
    /// How many times the session has been paused.
    pub pause_count: u32,
    /// Duration of the most recent background stay, in milliseconds.
    pub background_duration_ms: u64,
    /// Accumulated background time across the session, in milliseconds.
    pub total_pause_time_ms: u64,
}

impl LifecycleState {
    /// Lifecycle flags for a freshly created, foreground session.
    pub fn active() -> Self {
        Self {
            is_active: true,
            ..Self::default()
        }
    }
}

/// The durable root object holding everything needed to resume a triage
/// session: navigation, progress, preferences, undo state, and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unique identifier, generated at creation, immutable afterwards.
    pub session_id: String,
    /// Schema version of this record.
    pub version: String,
    /// Updated on every successful persist.
    pub last_saved: DateTime<Utc>,
    /// UI-resumption state.
    #[serde(default)]
    pub navigation: NavigationState,
    /// Triage progress.
    pub progress: ProgressState,
    /// Opaque user preferences.
    #[serde(default)]
    pub user_preferences: UserPreferences,
    /// Bounded undo stack.
    #[serde(default)]
    pub undo_state: UndoState,
    /// Cross-session bookkeeping.
    #[serde(default)]
    pub metadata: SessionStats,
    /// Foreground/background flags; rehydrated on resume.
    #[serde(default)]
    pub lifecycle: LifecycleState,
}

impl SessionRecord {
    /// Creates a fresh, active record with the given identifier.
    pub fn new(session_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            version: CURRENT_SCHEMA_VERSION.to_string(),
            last_saved: now,
            navigation: NavigationState::default(),
            progress: ProgressState::new(now),
            user_preferences: UserPreferences::default(),
            undo_state: UndoState::default(),
            metadata: SessionStats::default(),
            lifecycle: LifecycleState::active(),
        }
    }

    /// Creates a fresh record with a newly generated identifier.
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self::new(new_session_id(), now)
    }
}

/// Sidecar metadata blob, written next to the main record.
///
/// Small enough to read without deserializing the full session payload;
/// backs the cheap availability pre-check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Schema version of the stored record.
    pub version: String,
    /// Identifier of the stored record.
    pub session_id: String,
    /// When the record was last persisted.
    pub last_saved: DateTime<Utc>,
    /// Whether the payload is compressed.
    pub compressed: bool,
    /// Whether the payload lives in the secure store.
    pub encrypted: bool,
}

impl SessionMetadata {
    /// Builds the sidecar blob for a record about to be persisted.
    pub fn for_record(record: &SessionRecord, encrypted: bool) -> Self {
        Self {
            version: record.version.clone(),
            session_id: record.session_id.clone(),
            last_saved: record.last_saved,
            compressed: false,
            encrypted,
        }
    }
}
