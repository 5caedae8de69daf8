//! Access token holder.

pub mod store;

pub use store::{ListenerId, TokenChange, TokenListener, TokenStore};
