//! Application foreground/background phase feed.
//!
//! The host application owns OS-level lifecycle callbacks and forwards them
//! here; the lifecycle manager and the change tracker subscribe and react.
//! This keeps platform glue out of the persistence components and lets
//! tests drive transitions directly.

use tokio::sync::watch;

/// Coarse application phase as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppPhase {
    /// App visible and interactive.
    #[default]
    Foreground,
    /// App fully backgrounded; the process may be killed at any time.
    Background,
    /// App visible but not interactive (system sheet, app switcher).
    Inactive,
}

impl AppPhase {
    /// Whether this phase counts as "not foreground" for save purposes.
    pub fn is_backgrounded(self) -> bool {
        matches!(self, Self::Background | Self::Inactive)
    }
}

/// Broadcast feed of [`AppPhase`] transitions.
///
/// Cheap to clone; all clones share the same channel.
#[derive(Debug, Clone)]
pub struct AppPhaseFeed {
    tx: watch::Sender<AppPhase>,
}

impl AppPhaseFeed {
    /// Creates a feed starting in the foreground phase.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AppPhase::Foreground);
        Self { tx }
    }

    /// Publishes a phase transition. No-op when the phase is unchanged.
    pub fn set_phase(&self, phase: AppPhase) {
        self.tx.send_if_modified(|current| {
            if *current == phase {
                false
            } else {
                *current = phase;
                true
            }
        });
    }

    /// Current phase.
    pub fn current(&self) -> AppPhase {
        *self.tx.borrow()
    }

    /// Subscribes to phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<AppPhase> {
        self.tx.subscribe()
    }
}

impl Default for AppPhaseFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let feed = AppPhaseFeed::new();
        let mut rx = feed.subscribe();

        assert_eq!(feed.current(), AppPhase::Foreground);

        feed.set_phase(AppPhase::Background);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), AppPhase::Background);
    }

    #[tokio::test]
    async fn unchanged_phase_is_not_rebroadcast() {
        let feed = AppPhaseFeed::new();
        let mut rx = feed.subscribe();
        rx.mark_unchanged();

        feed.set_phase(AppPhase::Foreground);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn backgrounded_covers_inactive() {
        assert!(AppPhase::Background.is_backgrounded());
        assert!(AppPhase::Inactive.is_backgrounded());
        assert!(!AppPhase::Foreground.is_backgrounded());
    }
}
