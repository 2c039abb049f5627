//! Storage infrastructure for the sweep session persistence subsystem.
//!
//! Provides the production [`storage::StorageAdapter`] implementing
//! `sweep_core::store::SessionStore` over pluggable key-value media:
//! [`storage::FileMedium`] (atomic file-per-key storage) for devices and
//! [`storage::MemoryMedium`] for tests and hosts that persist elsewhere.
//!
//! ```ignore
//! use std::sync::Arc;
//! use sweep_core::config::PersistenceConfig;
//! use sweep_infrastructure::paths::SweepPaths;
//! use sweep_infrastructure::storage::{FileMedium, StorageAdapter};
//!
//! let config = PersistenceConfig::load(SweepPaths::config_file()?)?;
//! let medium = Arc::new(FileMedium::new(SweepPaths::session_dir()?)?);
//! let store = Arc::new(StorageAdapter::new(medium, config));
//! ```

pub mod paths;
pub mod storage;
