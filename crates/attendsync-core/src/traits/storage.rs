//! Durable key/value storage for the session slots.

use crate::result::AppResult;

/// Slot holding the raw access token string.
pub const TOKEN_SLOT: &str = "access_token";

/// Slot holding the JSON-encoded user profile.
pub const USER_SLOT: &str = "user_profile";

/// Trait for string-valued durable storage backends.
///
/// Calls are synchronous: the token store writes through on every mutation
/// and must observe its own writes immediately.
pub trait DurableStorage: Send + Sync + std::fmt::Debug + 'static {
    /// Read a slot. Returns `None` if it was never written or was removed.
    fn read(&self, slot: &str) -> AppResult<Option<String>>;

    /// Write a slot, replacing any previous value.
    fn write(&self, slot: &str, value: &str) -> AppResult<()>;

    /// Remove a slot. Removing an absent slot is not an error.
    fn remove(&self, slot: &str) -> AppResult<()>;
}
