//! Transport seam between the channel driver and the socket implementation.

use std::fmt;

use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use attendsync_core::error::AppError;

/// Query-string escaping for the token; unreserved characters pass through.
const TOKEN_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// WebSocket close codes that mean the server rejected the credential.
pub const AUTH_CLOSE_CODES: [u16; 4] = [1008, 4001, 4401, 4403];

/// Something that arrived on an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A text (or UTF-8 binary) frame.
    Text(String),
    /// A data frame that cannot be read as text.
    Unreadable(String),
    /// The peer closed the connection, or the stream ended.
    Closed {
        /// Close code, when the peer sent one.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },
    /// The connection failed at the transport level.
    Failed(String),
}

/// A failed connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// The handshake was answered with a non-101 HTTP status.
    Rejected {
        /// HTTP status of the handshake response.
        status: u16,
    },
    /// The handshake did not complete in time.
    Timeout,
    /// Any other failure (DNS, TCP, TLS, protocol).
    Failed(String),
}

impl ConnectError {
    /// Returns `true` if the server refused the credential.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, ConnectError::Rejected { status: 401 | 403 })
    }

    /// Convert into the error taxonomy.
    pub fn to_app_error(&self) -> AppError {
        if self.is_auth_rejection() {
            AppError::auth_expired(self.to_string())
        } else {
            AppError::transient(self.to_string())
        }
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectError::Rejected { status } => write!(f, "handshake rejected with HTTP {status}"),
            ConnectError::Timeout => f.write_str("handshake timed out"),
            ConnectError::Failed(reason) => write!(f, "connect failed: {reason}"),
        }
    }
}

impl std::error::Error for ConnectError {}

/// An open duplex connection.
#[async_trait]
pub trait Connection: Send {
    /// Wait for the next text frame or the end of the connection.
    ///
    /// Control frames are handled by the implementation and never returned.
    async fn recv(&mut self) -> Inbound;

    /// Close the connection gracefully. Errors are swallowed.
    async fn close(&mut self);
}

/// Opens connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connection to `url`.
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, ConnectError>;
}

/// WebSocket endpoint of one feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    ws_base: String,
    resource_path: String,
}

impl Endpoint {
    /// Create an endpoint from a base URL and a resource path.
    pub fn new(ws_base: impl Into<String>, resource_path: impl Into<String>) -> Self {
        Self {
            ws_base: ws_base.into().trim_end_matches('/').to_string(),
            resource_path: resource_path.into().trim_matches('/').to_string(),
        }
    }

    /// Returns the resource path.
    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }

    /// Full URL for a connection attempt with `token`.
    pub fn url(&self, token: &str) -> String {
        let sep = if self.resource_path.contains('?') { '&' } else { '?' };
        format!(
            "{}/{}{}token={}",
            self.ws_base,
            self.resource_path,
            sep,
            utf8_percent_encode(token, TOKEN_ESCAPE)
        )
    }
}
