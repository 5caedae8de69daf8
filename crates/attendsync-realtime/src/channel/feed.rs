//! Catalog of server feeds.

use std::fmt;

use serde::{Deserialize, Serialize};

use attendsync_core::config::RealtimeConfig;
use attendsync_core::error::AppError;

use crate::connection::ReconnectPolicy;
use crate::message::ResourceFilter;
use crate::message::validator::{validate_path_segment, validate_resource_path};

use super::options::ChannelOptions;

/// Resource name of attendance records.
pub const ATTENDANCE_RESOURCE: &str = "attendance";

/// A logical event feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Feed {
    /// Institution-wide activity for the admin dashboard.
    AdminEvents,
    /// Activity for the lecturer dashboard.
    LecturerEvents,
    /// Live check-ins of one attendance session.
    SessionAttendance(String),
    /// Any other path. Best-effort unless a policy is configured explicitly.
    Custom(String),
}

impl Feed {
    /// Parses `admin`, `lecturer`, `session:<id>` or `custom:<path>`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.split_once(':') {
            None if s == "admin" => Some(Feed::AdminEvents),
            None if s == "lecturer" => Some(Feed::LecturerEvents),
            Some(("session", id)) if !id.is_empty() => Some(Feed::SessionAttendance(id.to_string())),
            Some(("custom", path)) if !path.is_empty() => Some(Feed::Custom(path.to_string())),
            _ => None,
        }
    }

    /// Path of the feed below the WebSocket base URL.
    pub fn resource_path(&self) -> String {
        match self {
            Feed::AdminEvents => "admin/events".to_string(),
            Feed::LecturerEvents => "lecturer/events".to_string(),
            Feed::SessionAttendance(id) => format!("sessions/{id}/attendance"),
            Feed::Custom(path) => path.trim_matches('/').to_string(),
        }
    }

    /// Dashboard feeds a user is watching retry forever by default.
    pub fn is_interactive(&self) -> bool {
        !matches!(self, Feed::Custom(_))
    }

    /// Reconnect policy for this feed under `config`.
    pub fn default_policy(&self, config: &RealtimeConfig) -> ReconnectPolicy {
        if self.is_interactive() {
            ReconnectPolicy::from_max_attempts(config.max_attempts)
        } else {
            ReconnectPolicy::Bounded(config.best_effort_max_attempts.max(1))
        }
    }

    /// Resources delivered on this feed. A session's attendance feed only
    /// carries attendance records; dashboard feeds mix resources.
    pub fn resources(&self) -> ResourceFilter {
        match self {
            Feed::SessionAttendance(_) => ResourceFilter::only([ATTENDANCE_RESOURCE]),
            Feed::AdminEvents | Feed::LecturerEvents | Feed::Custom(_) => ResourceFilter::Any,
        }
    }

    /// Checks that the feed maps to a safe path.
    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            Feed::AdminEvents | Feed::LecturerEvents => Ok(()),
            Feed::SessionAttendance(id) => validate_path_segment(id),
            Feed::Custom(path) => validate_resource_path(path),
        }
    }

    /// Channel options for this feed.
    pub fn options(&self, config: &RealtimeConfig) -> Result<ChannelOptions, AppError> {
        self.validate()?;
        Ok(ChannelOptions::from_config(config, self.resource_path())
            .with_policy(self.default_policy(config))
            .with_resources(self.resources()))
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feed::AdminEvents => f.write_str("admin"),
            Feed::LecturerEvents => f.write_str("lecturer"),
            Feed::SessionAttendance(id) => write!(f, "session:{id}"),
            Feed::Custom(path) => write!(f, "custom:{path}"),
        }
    }
}
