//! Session status and snapshot types.

use serde::{Deserialize, Serialize};

use super::user::UserProfile;

/// Lifecycle status of the process-wide session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Start-up restore from durable storage is in progress.
    Restoring,
    /// A token and a user profile are both held.
    Authenticated,
    /// No credential is held.
    Anonymous,
}

impl SessionStatus {
    /// Returns the status name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Restoring => "restoring",
            SessionStatus::Authenticated => "authenticated",
            SessionStatus::Anonymous => "anonymous",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of the session.
///
/// `status == Authenticated` iff both `token` and `user` are `Some`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Current access token.
    pub token: Option<String>,
    /// Current user profile.
    pub user: Option<UserProfile>,
    /// Lifecycle status.
    pub status: SessionStatus,
}

impl Session {
    /// An empty, anonymous session.
    pub fn anonymous() -> Self {
        Self {
            token: None,
            user: None,
            status: SessionStatus::Anonymous,
        }
    }

    /// Returns `true` if the status agrees with the held credential.
    pub fn is_consistent(&self) -> bool {
        let has_both = self.token.is_some() && self.user.is_some();
        match self.status {
            SessionStatus::Authenticated => has_both,
            SessionStatus::Anonymous | SessionStatus::Restoring => !has_both,
        }
    }
}
