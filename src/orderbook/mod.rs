//! Order book module
//!
//! Maintains authoritative per-side price levels from snapshot/delta
//! messages and derives the bounded-depth display projection.

mod book;
mod debounce;
mod projection;
mod synchronizer;

pub use book::OrderBook;
pub use debounce::{Debounce, DebounceState};
pub use projection::DisplayTracker;
pub use synchronizer::{
    BookSettings, MessageOutcome, OrderBookSynchronizer, SynchronizerHandle,
    DEFAULT_MAX_LEVELS, DISPLAY_INTERVAL_MS,
};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Bid,
    Ask,
}

/// Resting quantity at one price on one side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
    /// Size seen at the previous update to this price
    pub prev_size: Decimal,
    /// Running size total from the touch to this level; projection only
    pub cumulative_total: Decimal,
    /// Price was absent from the previously emitted projection; projection only
    pub is_new_in_display: bool,
}

impl PriceLevel {
    pub fn new(price: Decimal, size: Decimal, prev_size: Decimal) -> Self {
        Self {
            price,
            size,
            prev_size,
            cumulative_total: Decimal::ZERO,
            is_new_in_display: false,
        }
    }
}

/// Display projection published to consumers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookView {
    /// Top bids, highest price first
    pub bids: Vec<PriceLevel>,
    /// Top asks, deepest (highest) price first
    pub asks: Vec<PriceLevel>,
    pub sequence_number: u64,
    pub last_update_timestamp: u64,
    pub is_initialized: bool,
    /// Cumulative total of the deepest displayed bid
    pub max_bid_total: Decimal,
    /// Cumulative total of the deepest displayed ask
    pub max_ask_total: Decimal,
    /// Incremented on every emitted projection
    pub revision: u64,
}
