//! Channel lifecycle states and the observable connection snapshot.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use attendsync_core::ErrorKind;

/// Lifecycle state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    /// Constructed, not yet started.
    Idle,
    /// A connection attempt is in flight.
    Connecting,
    /// The socket is open and delivering events.
    Open,
    /// Waiting out the backoff delay before the next attempt.
    Reconnecting,
    /// Terminal. No further transitions.
    Closed,
}

impl ChannelState {
    /// Returns the state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Idle => "idle",
            ChannelState::Connecting => "connecting",
            ChannelState::Open => "open",
            ChannelState::Reconnecting => "reconnecting",
            ChannelState::Closed => "closed",
        }
    }

    /// Returns `true` for the terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChannelState::Closed)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a channel reached `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseCause {
    /// `stop()` was called.
    Stopped,
    /// No token was available at reconnect time.
    LoggedOut,
    /// The server rejected the token.
    AuthExpired,
    /// The reconnect budget ran out.
    ReconnectExhausted,
}

/// Observable snapshot of a channel's connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConnection {
    /// Current state.
    pub state: ChannelState,
    /// Consecutive failed attempts since the last `Open`.
    pub attempt: u32,
    /// Delay of the currently scheduled retry, if any.
    pub retry_delay: Option<Duration>,
    /// Kind of the most recent failure.
    pub last_error: Option<ErrorKind>,
    /// Set once the channel is `Closed`.
    pub close_cause: Option<CloseCause>,
}

impl ChannelConnection {
    /// Snapshot of a channel that has not started.
    pub fn idle() -> Self {
        Self {
            state: ChannelState::Idle,
            attempt: 0,
            retry_delay: None,
            last_error: None,
            close_cause: None,
        }
    }
}

impl Default for ChannelConnection {
    fn default() -> Self {
        Self::idle()
    }
}
