//! Authentication backend trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::result::AppResult;
use crate::types::UserProfile;

/// Credential returned by a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthGrant {
    /// Access token.
    pub token: String,
    /// Profile of the user the token belongs to.
    pub user: UserProfile,
}

/// Authentication endpoints consumed by the session manager.
///
/// Implementations map a rejected token to `ErrorKind::AuthExpired`, refused
/// credentials to `ErrorKind::InvalidCredentials`, and connectivity problems
/// to `ErrorKind::TransientNetwork`.
#[async_trait]
pub trait AuthApi: Send + Sync + 'static {
    /// Exchange credentials for a token and profile.
    async fn login(&self, email: &str, password: &str) -> AppResult<AuthGrant>;

    /// Exchange the current token for a fresh one.
    async fn refresh(&self, token: &str) -> AppResult<String>;

    /// Fetch the profile the token belongs to.
    async fn fetch_profile(&self, token: &str) -> AppResult<UserProfile>;
}
