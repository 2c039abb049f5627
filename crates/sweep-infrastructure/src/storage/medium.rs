//! Durable key-value media.
//!
//! A [`StorageMedium`] is the lowest layer of the stack: opaque bytes
//! under string keys, nothing more. The storage adapter composes one or
//! two media (plain and secure) into the session store contract.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use sweep_core::error::Result;

/// Abstraction over a durable key-value medium.
///
/// Implementations must be `Send + Sync`; all operations are async.
/// Reads of missing keys return `Ok(None)` rather than an error.
#[async_trait]
pub trait StorageMedium: Send + Sync {
    /// Reads the bytes stored under `key`, or `None` when absent.
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Writes `bytes` under `key`, replacing any previous value.
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Lists all stored keys, in no particular order.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Size in bytes of the value under `key`, or `None` when absent.
    async fn len_of(&self, key: &str) -> Result<Option<u64>>;
}

/// Volatile in-memory medium.
///
/// Used by tests and by hosts that keep the durable copy elsewhere.
#[derive(Default)]
pub struct MemoryMedium {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryMedium {
    /// Creates an empty medium.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageMedium for MemoryMedium {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.lock().unwrap().keys().cloned().collect())
    }

    async fn len_of(&self, key: &str) -> Result<Option<u64>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(key)
            .map(|bytes| bytes.len() as u64))
    }
}
