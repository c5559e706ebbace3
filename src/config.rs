//! Configuration module for the order book synchronizer

use std::env;
use std::time::Duration;

use crate::error::{Result, SyncError};
use crate::orderbook::BookSettings;
use crate::websocket::FeedSettings;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket endpoint of the order book feed
    pub ws_endpoint: String,

    /// Market symbol (e.g., "BTCPFC_0")
    pub symbol: String,

    /// Subscription topic for the order book channel
    pub topic: String,

    /// Price levels shown per side
    pub max_levels: usize,

    /// Debounce window for delta-driven projections
    pub display_interval_ms: u64,

    /// Reconnection settings
    pub auto_reconnect: bool,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,

    /// Address for the health/metrics/book HTTP server
    pub http_addr: String,

    /// IPC socket path for publishing projections; disabled when unset
    pub ipc_socket_path: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let symbol = env::var("SYMBOL")
            .map(|s| s.trim().to_string())
            .unwrap_or(defaults.symbol);

        let config = Self {
            ws_endpoint: env::var("WS_ENDPOINT").unwrap_or(defaults.ws_endpoint),
            topic: env::var("BOOK_TOPIC").unwrap_or_else(|_| book_topic(&symbol)),
            symbol,
            max_levels: parse_var("MAX_LEVELS", defaults.max_levels),
            display_interval_ms: parse_var("DISPLAY_INTERVAL_MS", defaults.display_interval_ms),
            auto_reconnect: parse_var("AUTO_RECONNECT", defaults.auto_reconnect),
            reconnect_delay_ms: parse_var("RECONNECT_DELAY_MS", defaults.reconnect_delay_ms),
            max_reconnect_attempts: parse_var(
                "MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
            http_addr: env::var("HTTP_ADDR").unwrap_or(defaults.http_addr),
            ipc_socket_path: env::var("IPC_SOCKET_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the synchronizer cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.ws_endpoint.trim().is_empty() {
            return Err(SyncError::ConfigError("WS_ENDPOINT is empty".to_string()));
        }
        if self.topic.trim().is_empty() {
            return Err(SyncError::ConfigError("BOOK_TOPIC is empty".to_string()));
        }
        if self.max_levels == 0 {
            return Err(SyncError::ConfigError(
                "MAX_LEVELS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn feed_settings(&self) -> FeedSettings {
        FeedSettings {
            endpoint: self.ws_endpoint.clone(),
            topics: vec![self.topic.clone()],
            auto_reconnect: self.auto_reconnect,
            max_reconnect_attempts: self.max_reconnect_attempts,
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
        }
    }

    pub fn book_settings(&self) -> BookSettings {
        BookSettings {
            topic: self.topic.clone(),
            max_levels: self.max_levels,
            display_interval: Duration::from_millis(self.display_interval_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let symbol = "BTCPFC_0".to_string();
        Self {
            ws_endpoint: "wss://ws.btse.com/ws/oss/futures".to_string(),
            topic: book_topic(&symbol),
            symbol,
            max_levels: 8,
            display_interval_ms: 3000,
            auto_reconnect: true,
            reconnect_delay_ms: 3000,
            max_reconnect_attempts: 5,
            http_addr: "0.0.0.0:9090".to_string(),
            ipc_socket_path: None,
        }
    }
}

/// Order book channel topic for a symbol
pub fn book_topic(symbol: &str) -> String {
    format!("update:{}", symbol)
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
