//! Durable storage backends for the session slots.

pub mod file;
pub mod memory;

use std::sync::Arc;

use attendsync_core::config::SessionConfig;
use attendsync_core::result::AppResult;
use attendsync_core::traits::DurableStorage;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Build the storage backend selected by the session configuration.
pub fn from_config(config: &SessionConfig) -> AppResult<Arc<dyn DurableStorage>> {
    match &config.storage_dir {
        Some(dir) => Ok(Arc::new(FileStorage::open(dir)?)),
        None => Ok(Arc::new(MemoryStorage::new())),
    }
}
