//! Directory-backed slot storage.
//!
//! Each slot is one file under the storage directory. Writes go to a
//! temporary sibling first, are synced, and then renamed over the target so
//! a crash never leaves a half-written token behind.

use std::fs::{self, File};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use attendsync_core::error::AppError;
use attendsync_core::result::AppResult;
use attendsync_core::traits::DurableStorage;

/// Durable storage keeping one file per slot.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open (and create if needed) a storage directory.
    pub fn open(dir: impl Into<PathBuf>) -> AppResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            AppError::with_source(
                attendsync_core::ErrorKind::Storage,
                format!("Failed to create storage directory {}", dir.display()),
                e,
            )
        })?;
        Ok(Self { dir })
    }

    /// Returns the storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, slot: &str) -> AppResult<PathBuf> {
        if slot.is_empty()
            || !slot
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(AppError::validation(format!("Invalid slot name: {slot:?}")));
        }
        Ok(self.dir.join(slot))
    }
}

impl DurableStorage for FileStorage {
    fn read(&self, slot: &str) -> AppResult<Option<String>> {
        let path = self.slot_path(slot)?;
        match fs::read_to_string(&path) {
            Ok(content) if content.is_empty() => Ok(None),
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, slot: &str, value: &str) -> AppResult<()> {
        let path = self.slot_path(slot)?;
        let tmp_path = self.dir.join(format!(".{slot}.tmp"));

        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(value.as_bytes())?;
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, &path)?;
        debug!(slot, "Slot written");
        Ok(())
    }

    fn remove(&self, slot: &str) -> AppResult<()> {
        let path = self.slot_path(slot)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
