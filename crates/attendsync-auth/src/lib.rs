//! # attendsync-auth
//!
//! Credential handling for AttendSync: durable slot storage, the process-wide
//! [`TokenStore`], the [`SessionManager`] lifecycle (restore, login, periodic
//! refresh, logout), and the REST client for the authentication endpoints.

pub mod api;
pub mod session;
pub mod storage;
pub mod token;

pub use api::HttpAuthApi;
pub use session::{LogoutReason, SessionManager};
pub use storage::{FileStorage, MemoryStorage};
pub use token::{TokenChange, TokenStore};
