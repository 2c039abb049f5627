//! Durable storage: media and the session storage adapter.

mod adapter;
mod file_medium;
mod medium;

pub use adapter::StorageAdapter;
pub use file_medium::FileMedium;
pub use medium::{MemoryMedium, StorageMedium};
