//! Per-channel options.

use std::sync::Arc;
use std::time::Duration;

use attendsync_core::config::RealtimeConfig;

use crate::connection::{Backoff, Endpoint, Jitter, RandomJitter, ReconnectPolicy};
use crate::message::ResourceFilter;

/// Everything a channel needs besides its transport and token source.
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// WebSocket base URL.
    pub ws_base: String,
    /// Path of the feed below `ws_base`.
    pub resource_path: String,
    /// Reconnect budget.
    pub policy: ReconnectPolicy,
    /// Backoff parameters.
    pub backoff: Backoff,
    /// Jitter source for the backoff.
    pub jitter: Arc<dyn Jitter>,
    /// Handshake timeout.
    pub connect_timeout: Duration,
    /// Treat the connection as dead after this long without a frame.
    pub idle_timeout: Option<Duration>,
    /// Accepted resources.
    pub resources: ResourceFilter,
}

impl ChannelOptions {
    /// Options with default timings for one resource path.
    pub fn new(ws_base: impl Into<String>, resource_path: impl Into<String>) -> Self {
        Self::from_config(&RealtimeConfig::default(), resource_path).with_ws_base(ws_base)
    }

    /// Options from configuration. The policy is the interactive default;
    /// feeds override it.
    pub fn from_config(config: &RealtimeConfig, resource_path: impl Into<String>) -> Self {
        Self {
            ws_base: config.ws_base.clone(),
            resource_path: resource_path.into(),
            policy: ReconnectPolicy::from_max_attempts(config.max_attempts),
            backoff: Backoff::from_config(config),
            jitter: Arc::new(RandomJitter),
            connect_timeout: Duration::from_secs(config.connect_timeout_seconds.max(1)),
            idle_timeout: match config.idle_timeout_seconds {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            resources: ResourceFilter::Any,
        }
    }

    /// Set the base URL.
    pub fn with_ws_base(mut self, ws_base: impl Into<String>) -> Self {
        self.ws_base = ws_base.into();
        self
    }

    /// Set the reconnect policy.
    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the backoff parameters.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the jitter source.
    pub fn with_jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set the idle timeout.
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Restrict the accepted resources.
    pub fn with_resources(mut self, resources: ResourceFilter) -> Self {
        self.resources = resources;
        self
    }

    /// The endpoint built from base URL and path.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.ws_base.clone(), self.resource_path.clone())
    }
}
