//! WebSocket transport abstraction.
//!
//! Adapters never touch `tokio-tungstenite` directly: they speak to a
//! [`WsStream`] obtained from a [`WsConnector`]. The production connector
//! ([`TlsConnector`]) dials TLS WebSocket endpoints; tests swap in a
//! channel-backed fake to script disconnects and capture outbound frames.

use anyhow::Result;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// One inbound transport event.
#[derive(Debug, Clone, PartialEq)]
pub enum WsEvent {
    Text(String),
    Binary(Vec<u8>),
    /// Peer ping; the connection loop answers with a pong.
    Ping(Vec<u8>),
    /// Peer sent a close frame or the stream errored out.
    Closed,
}

/// An established WebSocket connection.
#[async_trait]
pub trait WsStream: Send {
    async fn send_text(&mut self, text: &str) -> Result<()>;
    async fn send_ping(&mut self) -> Result<()>;
    async fn send_pong(&mut self, payload: Vec<u8>) -> Result<()>;
    /// Next inbound event; `None` once the stream has ended.
    async fn next_event(&mut self) -> Option<WsEvent>;
    async fn close(&mut self);
}

/// Dials WebSocket connections. One connector per adapter; called again on
/// every reconnect attempt.
#[async_trait]
pub trait WsConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn WsStream>>;
}

// ---------------------------------------------------------------------------
// Production transport: tokio-tungstenite over TLS
// ---------------------------------------------------------------------------

/// Default connector using `tokio-tungstenite` with native TLS.
#[derive(Debug, Default)]
pub struct TlsConnector;

struct TlsStream {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl WsConnector for TlsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn WsStream>> {
        let (stream, response) = tokio_tungstenite::connect_async(url).await?;
        debug!("websocket handshake complete: {}", response.status());
        Ok(Box::new(TlsStream { inner: stream }))
    }
}

#[async_trait]
impl WsStream for TlsStream {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.inner.send(Message::Text(text.to_string().into())).await?;
        Ok(())
    }

    async fn send_ping(&mut self) -> Result<()> {
        self.inner.send(Message::Ping(Vec::new().into())).await?;
        Ok(())
    }

    async fn send_pong(&mut self, payload: Vec<u8>) -> Result<()> {
        self.inner.send(Message::Pong(payload.into())).await?;
        Ok(())
    }

    async fn next_event(&mut self) -> Option<WsEvent> {
        loop {
            return match self.inner.next().await? {
                Ok(Message::Text(text)) => Some(WsEvent::Text(text.to_string())),
                Ok(Message::Binary(data)) => Some(WsEvent::Binary(data.to_vec())),
                Ok(Message::Ping(data)) => Some(WsEvent::Ping(data.to_vec())),
                Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Ok(Message::Close(_)) => Some(WsEvent::Closed),
                Err(e) => {
                    debug!("websocket read error: {e}");
                    Some(WsEvent::Closed)
                }
            };
        }
    }

    async fn close(&mut self) {
        let _ = self.inner.close(None).await;
    }
}

// ---------------------------------------------------------------------------
// Test transport: channel-backed fake
// ---------------------------------------------------------------------------
