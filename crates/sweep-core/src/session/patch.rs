//! Shallow merge patches for the session record.

use sweep_types::{
    NavigationState, ProgressState, SessionRecord, SessionStats, UndoState, UserPreferences,
};

/// Partial update applied by `update_session`.
///
/// The merge is shallow: each provided subtree replaces the corresponding
/// subtree of the record wholesale, absent subtrees are left untouched.
/// `session_id`, `version`, and the lifecycle flags are never patchable
/// from outside; the lifecycle manager owns them.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub navigation: Option<NavigationState>,
    pub progress: Option<ProgressState>,
    pub user_preferences: Option<UserPreferences>,
    pub undo_state: Option<UndoState>,
    pub metadata: Option<SessionStats>,
}

impl SessionPatch {
    /// Empty patch; combine with the builder methods below.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the navigation subtree.
    pub fn navigation(mut self, navigation: NavigationState) -> Self {
        self.navigation = Some(navigation);
        self
    }

    /// Replaces the progress subtree.
    pub fn progress(mut self, progress: ProgressState) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Replaces the user preferences subtree.
    pub fn user_preferences(mut self, preferences: UserPreferences) -> Self {
        self.user_preferences = Some(preferences);
        self
    }

    /// Replaces the undo subtree.
    pub fn undo_state(mut self, undo: UndoState) -> Self {
        self.undo_state = Some(undo);
        self
    }

    /// Replaces the metadata subtree.
    pub fn metadata(mut self, metadata: SessionStats) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Applies the patch to a record. The undo stack is re-bounded after
    /// the merge so a caller-supplied stack cannot exceed its limit.
    pub(crate) fn apply(self, record: &mut SessionRecord) {
        if let Some(navigation) = self.navigation {
            record.navigation = navigation;
        }
        if let Some(progress) = self.progress {
            record.progress = progress;
        }
        if let Some(preferences) = self.user_preferences {
            record.user_preferences = preferences;
        }
        if let Some(undo) = self.undo_state {
            record.undo_state = undo;
            let limit = record.undo_state.max_undo_actions;
            if record.undo_state.undo_stack.len() > limit {
                let excess = record.undo_state.undo_stack.len() - limit;
                record.undo_state.undo_stack.drain(..excess);
            }
        }
        if let Some(metadata) = self.metadata {
            record.metadata = metadata;
        }
    }
}
