//! # attendsync-realtime
//!
//! Client-side real-time engine for the AttendSync dashboards. Provides:
//!
//! - Self-healing WebSocket channels with exponential backoff and jitter
//! - Token re-resolution on every connection attempt
//! - Inbound event decoding and validation
//! - A deterministic merge reducer for view-local entity collections
//! - Per-view channel registries bound to the view's lifetime

pub mod channel;
pub mod connection;
pub mod message;
pub mod metrics;
pub mod reducer;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::{ChannelOptions, Feed, RealtimeChannel};
pub use connection::{ChannelConnection, ChannelState, CloseCause, ReconnectPolicy, WsConnector};
pub use reducer::{Entity, EntityCollection, OrderingPolicy, apply_event};
pub use registry::{ChannelRegistry, LiveCollection};
