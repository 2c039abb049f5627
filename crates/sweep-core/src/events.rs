//! Lifecycle event delivery.
//!
//! Both the storage adapter and the lifecycle manager announce what they do
//! (`session_saved`, `session_loaded`, ...) to listeners registered per
//! event name. A panicking listener is isolated and logged; it never aborts
//! the save/load path or the other listeners for the same event.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

/// Events announced by the persistence components.
#[derive(Debug, Clone)]
pub enum PersistenceEvent {
    /// The session record was persisted.
    SessionSaved {
        session_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A session record was loaded from storage.
    SessionLoaded {
        session_id: String,
        timestamp: DateTime<Utc>,
    },
    /// The stored session and its backups were removed.
    SessionCleared,
    /// The session was paused on a background transition.
    SessionPaused { session_id: String },
    /// The session was resumed on a foreground transition.
    SessionResumed { session_id: String },
    /// Tracked changes exhausted their retries and were dropped.
    ChangesDropped { keys: Vec<String> },
}

impl PersistenceEvent {
    /// Name used for listener registration.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionSaved { .. } => "session_saved",
            Self::SessionLoaded { .. } => "session_loaded",
            Self::SessionCleared => "session_cleared",
            Self::SessionPaused { .. } => "session_paused",
            Self::SessionResumed { .. } => "session_resumed",
            Self::ChangesDropped { .. } => "changes_dropped",
        }
    }
}

/// Callback invoked with each matching event.
pub type EventListener = Arc<dyn Fn(&PersistenceEvent) + Send + Sync>;

/// Handle for removing a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct BusInner {
    next_id: u64,
    listeners: HashMap<String, Vec<(ListenerId, EventListener)>>,
}

/// Per-component listener registry.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<RwLock<BusInner>>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for the given event name.
    pub fn add_listener(&self, event: &str, listener: EventListener) -> ListenerId {
        let mut inner = self.inner.write().expect("event bus lock poisoned");
        inner.next_id += 1;
        let id = ListenerId(inner.next_id);
        inner
            .listeners
            .entry(event.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    /// Removes a previously registered listener. Unknown IDs are ignored.
    pub fn remove_listener(&self, id: ListenerId) {
        let mut inner = self.inner.write().expect("event bus lock poisoned");
        for listeners in inner.listeners.values_mut() {
            listeners.retain(|(lid, _)| *lid != id);
        }
    }

    /// Delivers an event to every listener registered for its name.
    ///
    /// Listener panics are caught and logged so one bad listener cannot
    /// starve the others or abort the calling path.
    pub fn emit(&self, event: &PersistenceEvent) {
        let listeners: Vec<EventListener> = {
            let inner = self.inner.read().expect("event bus lock poisoned");
            inner
                .listeners
                .get(event.name())
                .map(|ls| ls.iter().map(|(_, l)| l.clone()).collect())
                .unwrap_or_default()
        };

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::warn!(event = event.name(), "event listener panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn saved_event() -> PersistenceEvent {
        PersistenceEvent::SessionSaved {
            session_id: "session_x".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn listeners_receive_matching_events_only() {
        let bus = EventBus::new();
        let saved = Arc::new(AtomicUsize::new(0));
        let loaded = Arc::new(AtomicUsize::new(0));

        let saved_count = saved.clone();
        bus.add_listener(
            "session_saved",
            Arc::new(move |_| {
                saved_count.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let loaded_count = loaded.clone();
        bus.add_listener(
            "session_loaded",
            Arc::new(move |_| {
                loaded_count.fetch_add(1, Ordering::SeqCst);
            }),
        );

        bus.emit(&saved_event());

        assert_eq!(saved.load(Ordering::SeqCst), 1);
        assert_eq!(loaded.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_listener_does_not_starve_others() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        bus.add_listener("session_saved", Arc::new(|_| panic!("bad listener")));
        let counter = count.clone();
        bus.add_listener(
            "session_saved",
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        bus.emit(&saved_event());

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removed_listener_stops_firing() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = count.clone();
        let id = bus.add_listener(
            "session_saved",
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        bus.emit(&saved_event());
        bus.remove_listener(id);
        bus.emit(&saved_event());

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
