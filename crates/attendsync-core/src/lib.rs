//! # attendsync-core
//!
//! Core crate for AttendSync. Contains the seam traits, configuration
//! schemas, session/user types, the real-time event model, and the unified
//! error system.
//!
//! This crate has **no** internal dependencies on other AttendSync crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
