//! Connection plumbing: backoff, lifecycle states, and the socket transport.

pub mod backoff;
pub mod state;
pub mod transport;
pub mod websocket;

pub use backoff::{Backoff, FixedJitter, Jitter, RandomJitter, ReconnectPolicy};
pub use state::{ChannelConnection, ChannelState, CloseCause};
pub use transport::{AUTH_CLOSE_CODES, ConnectError, Connection, Connector, Endpoint, Inbound};
pub use websocket::WsConnector;
