//! Real-time channels: state machine, tokio driver, options, and feed catalog.

pub mod feed;
pub mod machine;
pub mod options;
pub mod realtime;

pub use feed::Feed;
pub use machine::{ChannelCommand, ChannelInput, ChannelMachine, Dropped};
pub use options::ChannelOptions;
pub use realtime::{AlertHandler, ChannelId, EventHandler, RealtimeChannel};
