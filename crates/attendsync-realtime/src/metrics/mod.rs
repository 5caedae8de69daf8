//! Per-channel metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Channel-level metrics counters.
#[derive(Debug, Default)]
pub struct ChannelMetrics {
    /// Connection attempts started
    pub connect_attempts: AtomicU64,
    /// Connections that reached `Open`
    pub connections_opened: AtomicU64,
    /// Reconnects scheduled after a failure
    pub reconnects_scheduled: AtomicU64,
    /// Text frames received
    pub messages_received: AtomicU64,
    /// Events delivered to the handler
    pub events_delivered: AtomicU64,
    /// Frames dropped as malformed
    pub malformed_dropped: AtomicU64,
    /// Well-formed frames ignored
    pub messages_ignored: AtomicU64,
    /// Events suppressed because the channel was stopped
    pub late_suppressed: AtomicU64,
}

impl ChannelMetrics {
    /// Create new zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reconnect_scheduled(&self) {
        self.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn event_delivered(&self) {
        self.events_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn malformed(&self) {
        self.malformed_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn ignored(&self) {
        self.messages_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn late(&self) {
        self.late_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            messages_ignored: self.messages_ignored.load(Ordering::Relaxed),
            late_suppressed: self.late_suppressed.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Connection attempts started
    pub connect_attempts: u64,
    /// Connections that reached `Open`
    pub connections_opened: u64,
    /// Reconnects scheduled after a failure
    pub reconnects_scheduled: u64,
    /// Text frames received
    pub messages_received: u64,
    /// Events delivered to the handler
    pub events_delivered: u64,
    /// Frames dropped as malformed
    pub malformed_dropped: u64,
    /// Well-formed frames ignored
    pub messages_ignored: u64,
    /// Events suppressed because the channel was stopped
    pub late_suppressed: u64,
}
