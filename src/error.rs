//! Error types for the order book synchronizer

use thiserror::Error;

/// Synchronizer and feed errors
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("WebSocket message error: {0}")]
    WebSocketMessage(String),

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("Sequence gap: expected previous sequence {expected}, got {got}")]
    SequenceGap { expected: u64, got: u64 },

    #[error("Delta received before the book was initialized")]
    NotInitialized,

    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::WebSocketConnection(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::ParseError(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for SyncError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        SyncError::SerializationError(err.to_string())
    }
}

impl From<prometheus::Error> for SyncError {
    fn from(err: prometheus::Error) -> Self {
        SyncError::MetricsError(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::IpcError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
