//! Message and path validation rules.

use attendsync_core::error::AppError;

/// Maximum allowed inbound message size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 65_536;

/// Validates the raw frame before decoding.
pub fn validate_inbound(raw: &str) -> Result<(), AppError> {
    if raw.len() > MAX_MESSAGE_SIZE {
        return Err(AppError::malformed(format!(
            "Message exceeds maximum size of {} bytes",
            MAX_MESSAGE_SIZE
        )));
    }

    if raw.trim().is_empty() {
        return Err(AppError::malformed("Empty message"));
    }

    Ok(())
}

/// Validates a single path segment such as a session ID.
pub fn validate_path_segment(segment: &str) -> Result<(), AppError> {
    if segment.is_empty() || segment.len() > 128 {
        return Err(AppError::validation("Invalid path segment length"));
    }

    if !segment
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::validation(
            "Path segment contains invalid characters",
        ));
    }

    Ok(())
}

/// Validates a resource path of `/`-separated segments.
pub fn validate_resource_path(path: &str) -> Result<(), AppError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() || trimmed.len() > 256 {
        return Err(AppError::validation("Invalid resource path length"));
    }
    trimmed.split('/').try_for_each(validate_path_segment)
}
