//! Reconnect budget and exponential backoff with jitter.

use std::fmt;
use std::time::Duration;

use rand::Rng;

use attendsync_core::config::RealtimeConfig;

/// How many reconnect attempts a channel may make before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconnectPolicy {
    /// Keep retrying forever (user-interactive feeds).
    Unbounded,
    /// Give up after this many consecutive failed attempts.
    Bounded(u32),
}

impl ReconnectPolicy {
    /// Map a configured attempt budget to a policy; `0` means unbounded.
    pub fn from_max_attempts(max_attempts: u32) -> Self {
        if max_attempts == 0 {
            ReconnectPolicy::Unbounded
        } else {
            ReconnectPolicy::Bounded(max_attempts)
        }
    }

    /// Returns `true` if a retry may be scheduled after `attempt` failures.
    pub fn allows(&self, attempt: u32) -> bool {
        match self {
            ReconnectPolicy::Unbounded => true,
            ReconnectPolicy::Bounded(max) => attempt < *max,
        }
    }
}

impl fmt::Display for ReconnectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconnectPolicy::Unbounded => f.write_str("unbounded"),
            ReconnectPolicy::Bounded(n) => write!(f, "bounded({n})"),
        }
    }
}

/// Source of the random component added to each delay.
pub trait Jitter: Send + Sync + fmt::Debug {
    /// Returns a value in `[0, max]`.
    fn sample(&self, max: Duration) -> Duration;
}

/// Uniform random jitter.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl Jitter for RandomJitter {
    fn sample(&self, max: Duration) -> Duration {
        let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=max_ms))
    }
}

/// Always the same jitter, clamped to the configured maximum.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedJitter(pub Duration);

impl Jitter for FixedJitter {
    fn sample(&self, max: Duration) -> Duration {
        self.0.min(max)
    }
}

/// Exponential backoff parameters.
///
/// `delay(attempt) = min(max, base * 2^attempt + jitter)`, so every delay is
/// at least `base` and never above `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay before the first retry, without jitter.
    pub base: Duration,
    /// Upper bound on any delay.
    pub max: Duration,
    /// Upper bound on the jitter.
    pub jitter_max: Duration,
}

impl Backoff {
    /// Build backoff parameters from configuration.
    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self {
            base: Duration::from_millis(config.base_delay_ms),
            max: Duration::from_millis(config.max_delay_ms.max(config.base_delay_ms)),
            jitter_max: Duration::from_millis(config.jitter_max_ms),
        }
    }

    /// Delay before the retry following `attempt` consecutive failures.
    pub fn delay(&self, attempt: u32, jitter: Duration) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        self.base
            .saturating_mul(factor)
            .saturating_add(jitter.min(self.jitter_max))
            .min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&RealtimeConfig::default())
    }
}
