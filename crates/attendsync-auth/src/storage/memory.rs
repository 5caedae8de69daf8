//! In-memory slot storage.

use dashmap::DashMap;

use attendsync_core::result::AppResult;
use attendsync_core::traits::DurableStorage;

/// Process-local storage; contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slots: DashMap<String, String>,
}

impl MemoryStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableStorage for MemoryStorage {
    fn read(&self, slot: &str) -> AppResult<Option<String>> {
        Ok(self.slots.get(slot).map(|v| v.value().clone()))
    }

    fn write(&self, slot: &str, value: &str) -> AppResult<()> {
        self.slots.insert(slot.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, slot: &str) -> AppResult<()> {
        self.slots.remove(slot);
        Ok(())
    }
}
