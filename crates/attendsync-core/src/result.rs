//! Convenience result type alias for AttendSync.

use crate::error::AppError;

/// A specialized `Result` type for AttendSync operations.
pub type AppResult<T> = Result<T, AppError>;
