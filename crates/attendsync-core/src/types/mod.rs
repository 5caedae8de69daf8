//! Shared domain types.

pub mod session;
pub mod user;

pub use session::{Session, SessionStatus};
pub use user::{Role, UserProfile, string_or_number};
