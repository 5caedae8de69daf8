//! Real-time channel configuration.

use serde::{Deserialize, Serialize};

/// Real-time (WebSocket) channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// WebSocket base URL, e.g. `wss://host/ws`.
    #[serde(default = "default_ws_base")]
    pub ws_base: String,
    /// First reconnect delay in milliseconds.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    /// Upper bound on any reconnect delay in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Upper bound of the uniform random jitter added to each delay.
    #[serde(default = "default_jitter_max")]
    pub jitter_max_ms: u64,
    /// Reconnect budget for user-interactive feeds. `0` means unbounded.
    #[serde(default)]
    pub max_attempts: u32,
    /// Reconnect budget for best-effort feeds.
    #[serde(default = "default_best_effort_attempts")]
    pub best_effort_max_attempts: u32,
    /// Handshake timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// Close the connection when no frame arrives for this many seconds.
    /// `0` disables the check.
    #[serde(default)]
    pub idle_timeout_seconds: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            ws_base: default_ws_base(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            jitter_max_ms: default_jitter_max(),
            max_attempts: 0,
            best_effort_max_attempts: default_best_effort_attempts(),
            connect_timeout_seconds: default_connect_timeout(),
            idle_timeout_seconds: 0,
        }
    }
}

fn default_ws_base() -> String {
    "ws://localhost:8000/ws".to_string()
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_jitter_max() -> u64 {
    500
}

fn default_best_effort_attempts() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    10
}
