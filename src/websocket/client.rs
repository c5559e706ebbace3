//! WebSocket client for the order book feed
//!
//! Handles connection, frame sending and message reception.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use super::transport::{Connector, FeedStream};
use crate::error::{Result, SyncError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens tokio-tungstenite connections
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    type Stream = WebSocketClient;

    async fn connect(&self, endpoint: &str) -> Result<WebSocketClient> {
        WebSocketClient::connect(endpoint).await
    }
}

/// WebSocket client for a single connection
pub struct WebSocketClient {
    stream: WsStream,
}

impl WebSocketClient {
    /// Connect to the WebSocket endpoint
    pub async fn connect(endpoint: &str) -> Result<Self> {
        info!(url = %endpoint, "Connecting to feed WebSocket");

        let (stream, response) = connect_async(endpoint).await.map_err(|e| {
            SyncError::WebSocketConnection(format!("Failed to connect: {}", e))
        })?;

        info!(status = ?response.status(), "WebSocket connected");

        Ok(Self { stream })
    }
}

impl FeedStream for WebSocketClient {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| SyncError::WebSocketMessage(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        match self.stream.next().await {
            Some(Ok(Message::Text(text))) => {
                debug!(len = text.len(), "Received text message");
                Ok(Some(text))
            }
            Some(Ok(Message::Binary(data))) => {
                let text = String::from_utf8_lossy(&data).to_string();
                Ok(Some(text))
            }
            Some(Ok(Message::Ping(data))) => {
                debug!("Received ping, sending pong");
                let _ = self.stream.send(Message::Pong(data)).await;
                Ok(None)
            }
            Some(Ok(Message::Pong(_))) => Ok(None),
            Some(Ok(Message::Close(frame))) => {
                warn!(frame = ?frame, "Received close frame");
                Err(SyncError::WebSocketConnection(
                    "Connection closed".to_string(),
                ))
            }
            Some(Ok(Message::Frame(_))) => Ok(None),
            Some(Err(e)) => {
                error!(error = %e, "WebSocket error");
                Err(SyncError::WebSocketMessage(e.to_string()))
            }
            None => {
                warn!("WebSocket stream ended");
                Err(SyncError::WebSocketConnection(
                    "Stream ended".to_string(),
                ))
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
