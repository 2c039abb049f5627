//! Core components of the sweep session persistence subsystem.
//!
//! The subsystem keeps a photo-triage session alive across app suspensions
//! and kills: a durable [`SessionRecord`](sweep_types::SessionRecord)
//! owned by the [`SessionLifecycleManager`], a debounced write-back
//! [`CategoryProgressCache`] for per-category progress, and a prioritized
//! [`ChangeTracker`] that buffers arbitrary keyed changes and persists
//! them on a timer, on criticality, or when the app heads to the
//! background.
//!
//! Storage is reached exclusively through the [`store::SessionStore`]
//! trait; the `sweep-infrastructure` crate provides the production
//! adapter. There are no singletons: construct the components once at the
//! application root and pass the handles around.
//!
//! ```ignore
//! use std::sync::Arc;
//! use sweep_core::{
//!     cache::CategoryProgressCache, config::PersistenceConfig,
//!     phase::AppPhaseFeed, session::SessionLifecycleManager,
//!     tracker::ChangeTracker,
//! };
//!
//! let config = PersistenceConfig::default();
//! let store: Arc<dyn sweep_core::store::SessionStore> = /* adapter */;
//! let phase = AppPhaseFeed::new();
//!
//! let cache = CategoryProgressCache::new(store.clone(), config.clone());
//! let manager = SessionLifecycleManager::new(
//!     store.clone(), cache.clone(), config.clone(), phase.clone());
//! let tracker = ChangeTracker::new(store, config, phase);
//!
//! manager.initialize().await?;
//! tracker.start().await;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod phase;
pub mod session;
pub mod store;
pub mod tracker;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export the common error type.
pub use error::{Result, SweepError};
