//! `tokio-tungstenite` transport.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use super::transport::{ConnectError, Connection, Connector, Inbound};

/// Connector opening real WebSocket connections.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    /// Creates a connector whose handshakes give up after `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, ConnectError> {
        match time::timeout(self.connect_timeout, connect_async(url)).await {
            Err(_) => Err(ConnectError::Timeout),
            Ok(Err(WsError::Http(response))) => Err(ConnectError::Rejected {
                status: response.status().as_u16(),
            }),
            Ok(Err(e)) => Err(ConnectError::Failed(e.to_string())),
            Ok(Ok((stream, response))) => {
                debug!(status = response.status().as_u16(), "WebSocket handshake complete");
                Ok(Box::new(WsConnection { stream }))
            }
        }
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WsConnection {
    async fn recv(&mut self) -> Inbound {
        loop {
            match self.stream.next().await {
                None => {
                    return Inbound::Closed {
                        code: None,
                        reason: "stream ended".to_string(),
                    };
                }
                Some(Err(e)) => return Inbound::Failed(e.to_string()),
                Some(Ok(Message::Text(text))) => return Inbound::Text(text.as_str().to_owned()),
                Some(Ok(Message::Binary(bytes))) => return binary_frame(&bytes),
                Some(Ok(Message::Close(frame))) => {
                    return match frame {
                        Some(frame) => Inbound::Closed {
                            code: Some(u16::from(frame.code)),
                            reason: frame.reason.as_str().to_owned(),
                        },
                        None => Inbound::Closed {
                            code: None,
                            reason: String::new(),
                        },
                    };
                }
                // Pongs are queued by tungstenite while reading.
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "WebSocket close failed");
        }
        // Drain until the peer acknowledges so the close handshake completes.
        let _ = time::timeout(Duration::from_secs(1), async {
            while let Some(Ok(_)) = self.stream.next().await {}
        })
        .await;
    }
}

/// Binary frames carry the same JSON as text frames; anything that is not
/// UTF-8 is reported as unreadable rather than repaired.
fn binary_frame(bytes: &[u8]) -> Inbound {
    match std::str::from_utf8(bytes) {
        Ok(text) => Inbound::Text(text.to_owned()),
        Err(e) => Inbound::Unreadable(format!("binary frame is not UTF-8: {e}")),
    }
}
