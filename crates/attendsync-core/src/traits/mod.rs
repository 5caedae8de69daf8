//! Core trait definitions.
//!
//! These are the seams between the session core and its collaborators:
//! durable storage, the authentication backend, and token consumers.

pub mod auth;
pub mod storage;
pub mod token;

pub use auth::{AuthApi, AuthGrant};
pub use storage::{DurableStorage, TOKEN_SLOT, USER_SLOT};
pub use token::TokenSource;
