//! Per-view ownership of channels and the collections they feed.

pub mod live;
pub mod view;

pub use live::LiveCollection;
pub use view::ChannelRegistry;
