//! End-to-end flows through the full stack: lifecycle manager, progress
//! cache, and change tracker over the real storage adapter.

use std::sync::Arc;
use std::time::Duration;

use sweep_core::cache::CategoryProgressCache;
use sweep_core::config::PersistenceConfig;
use sweep_core::phase::{AppPhase, AppPhaseFeed};
use sweep_core::session::{SessionLifecycleManager, SessionPatch};
use sweep_core::store::SessionStore;
use sweep_core::tracker::ChangeTracker;
use sweep_infrastructure::storage::{FileMedium, MemoryMedium, StorageAdapter};
use sweep_types::{
    CategoryKind, CategoryProgressPatch, ChangePriority, NavigationState, SESSION_ID_PREFIX,
};
use tempfile::TempDir;

fn test_config() -> PersistenceConfig {
    PersistenceConfig {
        debounce_delay: Duration::from_millis(50),
        auto_flush_interval: None,
        auto_save_enabled: false,
        ..PersistenceConfig::default()
    }
}

fn file_store(dir: &TempDir) -> Arc<StorageAdapter> {
    let medium = Arc::new(FileMedium::new(dir.path()).unwrap());
    Arc::new(StorageAdapter::new(medium, test_config()))
}

fn manager_over(store: Arc<StorageAdapter>) -> (SessionLifecycleManager, AppPhaseFeed) {
    let feed = AppPhaseFeed::new();
    let cache = CategoryProgressCache::new(store.clone(), test_config());
    let manager =
        SessionLifecycleManager::new(store, cache, test_config(), feed.clone());
    (manager, feed)
}

fn category_update(completed: u32, kind: CategoryKind) -> CategoryProgressPatch {
    CategoryProgressPatch {
        total_photos: Some(40),
        completed_photos: Some(completed),
        last_photo_index: Some(completed as usize),
        category_type: Some(kind),
        ..CategoryProgressPatch::default()
    }
}

#[tokio::test]
async fn fresh_session_and_category_progress_survive_a_restart() {
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir);

    let feed = AppPhaseFeed::new();
    let cache = CategoryProgressCache::new(store.clone(), test_config());
    let manager = SessionLifecycleManager::new(
        store.clone(),
        cache.clone(),
        test_config(),
        feed.clone(),
    );

    // Nothing stored: a brand-new session is synthesized.
    let record = manager.initialize().await.unwrap();
    assert!(record.session_id.starts_with(SESSION_ID_PREFIX));
    assert_eq!(record.progress.photos_processed, 0);

    // Ten updates across two categories.
    for i in 1..=5 {
        cache
            .update_category_progress("2024-06", category_update(i, CategoryKind::Month))
            .await;
        cache
            .update_category_progress("screenshots", category_update(i * 2, CategoryKind::Source))
            .await;
    }
    cache.flush_pending_writes().await.unwrap();

    // Simulated restart: a second adapter over the same directory.
    let reopened = file_store(&dir);
    let reloaded = reopened.load().await.unwrap().unwrap();

    assert_eq!(reloaded.session_id, record.session_id);
    let months = &reloaded.progress.category_memory["2024-06"];
    let sources = &reloaded.progress.category_memory["screenshots"];
    // Last update per category wins.
    assert_eq!(months.completed_photos, 5);
    assert_eq!(months.category_type, CategoryKind::Month);
    assert_eq!(sources.completed_photos, 10);
    assert_eq!(sources.category_type, CategoryKind::Source);
}

#[tokio::test]
async fn navigation_state_round_trips_across_a_restart() {
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir);
    let (manager, _feed) = manager_over(store);

    let record = manager.initialize().await.unwrap();
    manager
        .update_session(SessionPatch::new().navigation(NavigationState {
            current_screen: "category".to_string(),
            current_photo_index: 17,
            selected_category_id: Some("2024-06".to_string()),
            selected_category_type: Some(CategoryKind::Month),
            scroll_position: 320.5,
        }))
        .await
        .unwrap();
    manager.save_session().await.unwrap();

    let reopened = file_store(&dir);
    let (manager2, _feed2) = manager_over(reopened);
    let restored = manager2.initialize().await.unwrap();

    assert_eq!(restored.session_id, record.session_id);
    assert_eq!(restored.navigation.current_screen, "category");
    assert_eq!(restored.navigation.current_photo_index, 17);
    assert_eq!(
        restored.navigation.selected_category_id.as_deref(),
        Some("2024-06")
    );
    assert!(restored.lifecycle.is_active);
}

#[tokio::test]
async fn tracked_changes_replay_after_an_interrupted_run() {
    let medium = Arc::new(MemoryMedium::new());
    let store = Arc::new(StorageAdapter::new(medium.clone(), test_config()));
    let feed = AppPhaseFeed::new();

    // First run: buffer some changes and persist them as snapshots, then
    // vanish without clearing the log (process killed).
    let tracker = ChangeTracker::new(store.clone(), test_config(), feed.clone());
    tracker.start().await;
    tracker
        .track_change("photo-1", serde_json::json!("kept"), ChangePriority::Normal)
        .await;
    tracker
        .track_change("photo-2", serde_json::json!("deleted"), ChangePriority::Low)
        .await;
    tracker
        .track_change("undo", serde_json::json!([1]), ChangePriority::Critical)
        .await;
    tracker.save_progress(true).await.unwrap();
    drop(tracker);

    // Second run: the snapshot log is replayed into the buffer so the
    // changes persist again through the normal path.
    let revived = ChangeTracker::new(store.clone(), test_config(), feed);
    revived.start().await;

    let stats = revived.stats().await;
    assert_eq!(stats.pending_changes, 3);

    revived.save_progress(false).await.unwrap();
    let latest = store.latest_snapshot().await.unwrap().unwrap();
    assert_eq!(latest.changes.len(), 3);
    revived.dispose().await;
}

#[tokio::test]
async fn backgrounding_pauses_the_session_and_flushes_tracked_work() {
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir);

    let feed = AppPhaseFeed::new();
    let cache = CategoryProgressCache::new(store.clone(), test_config());
    let manager = SessionLifecycleManager::new(
        store.clone(),
        cache.clone(),
        test_config(),
        feed.clone(),
    );
    let tracker = ChangeTracker::new(store.clone(), test_config(), feed.clone());

    manager.initialize().await.unwrap();
    tracker.start().await;

    cache
        .update_category_progress("2024-06", category_update(3, CategoryKind::Month))
        .await;
    tracker
        .track_change("scroll", serde_json::json!(88), ChangePriority::Normal)
        .await;

    feed.set_phase(AppPhase::Background);
    tokio::time::sleep(Duration::from_millis(300)).await;

    // The stored record is paused and carries the flushed progress.
    let stored = store.load().await.unwrap().unwrap();
    assert!(stored.lifecycle.is_paused);
    assert_eq!(
        stored.progress.category_memory["2024-06"].completed_photos,
        3
    );

    // The tracked change went out as a snapshot.
    assert!(store.latest_snapshot().await.unwrap().is_some());
    assert_eq!(tracker.stats().await.pending_changes, 0);

    // Coming back resumes the same session.
    feed.set_phase(AppPhase::Foreground);
    tokio::time::sleep(Duration::from_millis(300)).await;
    let resumed = manager.get_current_session().await.unwrap();
    assert!(resumed.lifecycle.is_active);
    assert_eq!(resumed.lifecycle.pause_count, 1);

    tracker.dispose().await;
    manager.dispose().await;
}

#[tokio::test]
async fn dispose_flushes_everything_for_the_next_launch() {
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir);

    let feed = AppPhaseFeed::new();
    let cache = CategoryProgressCache::new(store.clone(), test_config());
    let manager = SessionLifecycleManager::new(
        store.clone(),
        cache.clone(),
        test_config(),
        feed,
    );

    manager.initialize().await.unwrap();
    cache
        .update_category_progress("camera_roll", category_update(9, CategoryKind::Source))
        .await;
    manager.dispose().await;

    let reopened = file_store(&dir);
    let stored = reopened.load().await.unwrap().unwrap();
    assert!(!stored.lifecycle.is_active);
    assert_eq!(
        stored.progress.category_memory["camera_roll"].completed_photos,
        9
    );
}
