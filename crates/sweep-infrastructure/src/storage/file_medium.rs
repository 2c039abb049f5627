//! File-backed key-value medium with atomic writes.
//!
//! One file per key under a base directory. Writes go to a temporary file
//! first, are synced, and then renamed over the target, so a crash mid-write
//! never leaves a half-written value behind.

use super::medium::StorageMedium;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use sweep_core::error::{Result, SweepError};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// File-per-key medium.
///
/// # File layout
///
/// ```text
/// base_dir/
/// ├── session.json
/// ├── session_meta.json
/// ├── backup_0.json
/// └── snapshot_00001718000000000000.json
/// ```
#[derive(Debug, Clone)]
pub struct FileMedium {
    base_dir: PathBuf,
}

impl FileMedium {
    /// Creates the medium, creating the base directory if needed.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)
            .map_err(|e| SweepError::storage_unavailable(format!(
                "cannot create storage directory {}: {e}",
                base_dir.display()
            )))?;
        Ok(Self { base_dir })
    }

    /// Base directory backing this medium.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", sanitize_key(key)))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!(".{}.json.tmp", sanitize_key(key)))
    }
}

/// Restricts keys to a safe filename alphabet.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl StorageMedium for FileMedium {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.file_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let tmp_path = self.temp_path(key);
        let path = self.file_path(key);

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.file_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.base_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension() != Some(std::ffi::OsStr::new("json")) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            // Skip in-flight temp files.
            if name.starts_with('.') {
                continue;
            }
            keys.push(name.to_string());
        }
        Ok(keys)
    }

    async fn len_of(&self, key: &str) -> Result<Option<u64>> {
        match fs::metadata(self.file_path(key)).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
