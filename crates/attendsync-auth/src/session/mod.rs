//! Session lifecycle.

pub mod manager;

pub use manager::{LogoutReason, SessionManager};
