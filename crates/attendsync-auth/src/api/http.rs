//! REST implementation of the authentication endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use attendsync_core::ErrorKind;
use attendsync_core::config::ApiConfig;
use attendsync_core::error::AppError;
use attendsync_core::result::AppResult;
use attendsync_core::traits::{AuthApi, AuthGrant};
use attendsync_core::types::UserProfile;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(alias = "access_token", alias = "access")]
    token: String,
    user: UserProfile,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(alias = "access_token", alias = "access")]
    token: String,
}

/// Authentication client for the dashboard REST backend.
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    client: Client,
    base_url: String,
}

impl HttpAuthApi {
    /// Build a client from the API configuration.
    pub fn new(config: &ApiConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds.max(1)))
            .build()
            .map_err(|e| {
                AppError::with_source(ErrorKind::Configuration, "Failed to build HTTP client", e)
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, email: &str, password: &str) -> AppResult<AuthGrant> {
        let response = self
            .client
            .post(self.url("auth/login"))
            .json(&LoginRequest { email, password })
            .send()
            .await
            .map_err(map_transport)?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::BAD_REQUEST => {
                Err(AppError::invalid_credentials("Invalid email or password"))
            }
            _ => {
                let body: LoginResponse = decode(response, "login").await?;
                Ok(AuthGrant {
                    token: body.token,
                    user: body.user,
                })
            }
        }
    }

    async fn refresh(&self, token: &str) -> AppResult<String> {
        let response = self
            .client
            .post(self.url("auth/refresh"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(map_transport)?;

        let body: RefreshResponse = decode(response, "refresh").await?;
        Ok(body.token)
    }

    async fn fetch_profile(&self, token: &str) -> AppResult<UserProfile> {
        let response = self
            .client
            .get(self.url("auth/me"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(map_transport)?;

        decode(response, "profile").await
    }
}

async fn decode<T: DeserializeOwned>(response: Response, endpoint: &str) -> AppResult<T> {
    let status = response.status();
    if !status.is_success() {
        debug!(endpoint, status = status.as_u16(), "Auth endpoint returned an error status");
        return Err(map_status(status, endpoint));
    }

    let bytes = response.bytes().await.map_err(map_transport)?;
    serde_json::from_slice(&bytes).map_err(|e| {
        AppError::with_source(
            ErrorKind::Serialization,
            format!("Undecodable {endpoint} response"),
            e,
        )
    })
}

/// Map a non-success status to an error kind.
fn map_status(status: StatusCode, endpoint: &str) -> AppError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AppError::auth_expired(format!("{endpoint} rejected the token ({status})"))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            AppError::transient(format!("{endpoint} unavailable ({status})"))
        }
        s if s.is_server_error() => AppError::transient(format!("{endpoint} failed ({status})")),
        _ => AppError::internal(format!("{endpoint} returned unexpected status {status}")),
    }
}

fn map_transport(err: reqwest::Error) -> AppError {
    if err.is_decode() {
        return AppError::with_source(ErrorKind::Serialization, "Undecodable response body", err);
    }
    AppError::with_source(
        ErrorKind::TransientNetwork,
        format!("Auth request failed: {err}"),
        err,
    )
}
