//! Platform path resolution for sweep's persisted data.
//!
//! # Directory Structure
//!
//! ```text
//! <platform data dir>/sweep/
//! └── session/                 # storage adapter key space (FileMedium)
//!     ├── session.json
//!     ├── session_meta.json
//!     ├── backup_0.json
//!     └── snapshot_*.json
//!
//! <platform config dir>/sweep/
//! └── persistence.toml         # optional PersistenceConfig overrides
//! ```

use std::path::PathBuf;

/// Errors that can occur during path resolution.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// The platform data/config directory could not be determined.
    #[error("Cannot determine platform directories")]
    PlatformDirsNotFound,
}

/// Unified path management for sweep.
pub struct SweepPaths;

impl SweepPaths {
    /// Returns the sweep data directory (e.g. `~/.local/share/sweep/`).
    pub fn data_dir() -> Result<PathBuf, PathError> {
        dirs::data_dir()
            .map(|dir| dir.join("sweep"))
            .ok_or(PathError::PlatformDirsNotFound)
    }

    /// Returns the directory backing the session key space.
    pub fn session_dir() -> Result<PathBuf, PathError> {
        Ok(Self::data_dir()?.join("session"))
    }

    /// Returns the sweep config directory (e.g. `~/.config/sweep/`).
    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join("sweep"))
            .ok_or(PathError::PlatformDirsNotFound)
    }

    /// Returns the path of the optional persistence config override file.
    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("persistence.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_dir_is_under_data_dir() {
        let data_dir = SweepPaths::data_dir().unwrap();
        let session_dir = SweepPaths::session_dir().unwrap();
        assert!(session_dir.starts_with(&data_dir));
        assert!(session_dir.ends_with("session"));
    }

    #[test]
    fn config_file_is_under_config_dir() {
        let config_dir = SweepPaths::config_dir().unwrap();
        let config_file = SweepPaths::config_file().unwrap();
        assert!(config_file.starts_with(&config_dir));
        assert!(config_file.ends_with("persistence.toml"));
    }
}
