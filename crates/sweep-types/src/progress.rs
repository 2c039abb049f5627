//! Per-category progress entries and navigation history items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a category was derived from the photo library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    /// Bucketed by calendar month.
    Month,
    /// Bucketed by capture source (camera roll, screenshots, ...).
    Source,
}

/// The user's position and tallies within one category.
///
/// Invariants: `completed_photos <= total_photos`, and `last_access_time`
/// never moves backwards for a given category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryProgress {
    /// Photo the user last looked at.
    pub last_photo_id: String,
    /// Index of that photo within the category.
    pub last_photo_index: usize,
    /// Photos in the category.
    pub total_photos: u32,
    /// Photos already triaged.
    pub completed_photos: u32,
    /// Photos kept, when the category tracks it.
    pub kept_count: Option<u32>,
    /// Photos deleted, when the category tracks it.
    pub deleted_count: Option<u32>,
    /// When this category was last touched.
    pub last_access_time: DateTime<Utc>,
    /// How the category was derived.
    pub category_type: CategoryKind,
}

impl CategoryProgress {
    /// Creates an empty entry for a category of the given kind.
    pub fn new(category_type: CategoryKind, now: DateTime<Utc>) -> Self {
        Self {
            last_photo_id: String::new(),
            last_photo_index: 0,
            total_photos: 0,
            completed_photos: 0,
            kept_count: None,
            deleted_count: None,
            last_access_time: now,
            category_type,
        }
    }

    /// Merges a partial update into this entry.
    ///
    /// Fields not present in the patch are preserved. `completed_photos`
    /// is clamped to `total_photos` after the merge, and `last_access_time`
    /// only ever moves forward.
    pub fn apply(&mut self, patch: &CategoryProgressPatch, now: DateTime<Utc>) {
        if let Some(ref id) = patch.last_photo_id {
            self.last_photo_id = id.clone();
        }
        if let Some(index) = patch.last_photo_index {
            self.last_photo_index = index;
        }
        if let Some(total) = patch.total_photos {
            self.total_photos = total;
        }
        if let Some(completed) = patch.completed_photos {
            self.completed_photos = completed;
        }
        if let Some(kept) = patch.kept_count {
            self.kept_count = Some(kept);
        }
        if let Some(deleted) = patch.deleted_count {
            self.deleted_count = Some(deleted);
        }
        if let Some(kind) = patch.category_type {
            self.category_type = kind;
        }

        self.completed_photos = self.completed_photos.min(self.total_photos);
        if now > self.last_access_time {
            self.last_access_time = now;
        }
    }
}

/// Partial update for a [`CategoryProgress`] entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryProgressPatch {
    pub last_photo_id: Option<String>,
    pub last_photo_index: Option<usize>,
    pub total_photos: Option<u32>,
    pub completed_photos: Option<u32>,
    pub kept_count: Option<u32>,
    pub deleted_count: Option<u32>,
    pub category_type: Option<CategoryKind>,
}

/// One visited route in the navigation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationEntry {
    /// Route name as the UI layer knows it.
    pub route_name: String,
    /// Route parameters, opaque to this subsystem.
    #[serde(default)]
    pub params: serde_json::Value,
    /// When the route was entered.
    pub timestamp: DateTime<Utc>,
}

impl NavigationEntry {
    /// Creates an entry for a route visited at `timestamp`.
    pub fn new(
        route_name: impl Into<String>,
        params: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            route_name: route_name.into(),
            params,
            timestamp,
        }
    }
}
