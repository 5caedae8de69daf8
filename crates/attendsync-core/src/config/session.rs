//! Session lifecycle configuration.

use serde::{Deserialize, Serialize};

/// Session lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Interval between token refresh calls, in seconds.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,
    /// Directory holding the persisted token and profile slots.
    /// `None` keeps the session in memory only.
    #[serde(default)]
    pub storage_dir: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_interval_seconds: default_refresh_interval(),
            storage_dir: None,
        }
    }
}

fn default_refresh_interval() -> u64 {
    600
}
