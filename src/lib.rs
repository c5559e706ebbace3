//! Order book synchronizer library
//!
//! Keeps a local order book consistent with a streaming snapshot/delta
//! feed. The feed connection reconnects and resubscribes on its own, the
//! synchronizer checks sequence continuity and merges deltas, and a
//! debounced projection exposes the top levels of each side.

use std::sync::Arc;
use tokio::sync::watch;

pub mod config;
pub mod error;
pub mod metrics;
pub mod orderbook;
pub mod parser;
pub mod publisher;
pub mod websocket;

pub use config::Config;
pub use error::{Result, SyncError};
pub use metrics::FeedMetrics;
pub use orderbook::{
    BookSettings, BookView, MessageOutcome, OrderBook, OrderBookSynchronizer, PriceLevel, Side,
    SynchronizerHandle,
};
pub use parser::{BookUpdate, LevelUpdate, ParsedMessage, UpdateKind};
pub use publisher::Publisher;
pub use websocket::{
    ConnectionState, Connector, FeedConnection, FeedControl, FeedHandle, FeedSettings,
    FeedStream, TungsteniteConnector,
};

/// Application state shared with the HTTP handlers
pub struct AppState {
    pub view: watch::Receiver<BookView>,
    pub feed: FeedHandle,
    pub config: Arc<Config>,
}
