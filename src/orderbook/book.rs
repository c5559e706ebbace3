//! Authoritative order book state
//!
//! Uses BTreeMap per side so the projection can walk levels from the touch
//! without sorting.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use super::{PriceLevel, Side};
use crate::error::{Result, SyncError};
use crate::parser::{BookUpdate, LevelUpdate};

/// Price levels for both sides plus synchronization state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderBook {
    bids: BTreeMap<Decimal, PriceLevel>,
    asks: BTreeMap<Decimal, PriceLevel>,
    /// Last applied sequence number
    sequence_number: u64,
    /// Timestamp of the last applied message
    last_update_timestamp: u64,
    /// Whether a snapshot has been applied
    initialized: bool,
}

impl OrderBook {
    /// Create an empty, uninitialized book
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild both sides from a snapshot.
    ///
    /// Levels with `size <= 0` are skipped. The snapshot's sequence number
    /// replaces the held one unconditionally.
    pub fn apply_snapshot(&mut self, snapshot: &BookUpdate) {
        self.bids.clear();
        self.asks.clear();

        for level in &snapshot.bids {
            if level.size > Decimal::ZERO {
                self.bids
                    .insert(level.price, PriceLevel::new(level.price, level.size, level.size));
            }
        }

        for level in &snapshot.asks {
            if level.size > Decimal::ZERO {
                self.asks
                    .insert(level.price, PriceLevel::new(level.price, level.size, level.size));
            }
        }

        self.sequence_number = snapshot.seq_num;
        self.last_update_timestamp = snapshot.timestamp;
        self.initialized = true;
    }

    /// Check that a delta continues the held sequence
    pub fn check_sequence(&self, delta: &BookUpdate) -> Result<()> {
        if !self.initialized {
            return Err(SyncError::NotInitialized);
        }
        if delta.prev_seq_num != self.sequence_number {
            return Err(SyncError::SequenceGap {
                expected: self.sequence_number,
                got: delta.prev_seq_num,
            });
        }
        if delta.seq_num < self.sequence_number {
            return Err(SyncError::SequenceGap {
                expected: self.sequence_number,
                got: delta.seq_num,
            });
        }
        Ok(())
    }

    /// Merge a delta.
    ///
    /// The sequence is verified before anything is touched; on error the
    /// book is left exactly as it was.
    pub fn apply_delta(&mut self, delta: &BookUpdate) -> Result<()> {
        self.check_sequence(delta)?;

        for level in &delta.bids {
            self.update_side(Side::Bid, level);
        }

        for level in &delta.asks {
            self.update_side(Side::Ask, level);
        }

        self.sequence_number = delta.seq_num;
        self.last_update_timestamp = delta.timestamp;
        Ok(())
    }

    /// Insert, replace or remove a single price level
    fn update_side(&mut self, side: Side, level: &LevelUpdate) {
        let levels = self.side_mut(side);
        if level.size <= Decimal::ZERO {
            levels.remove(&level.price);
            return;
        }

        let prev_size = levels
            .get(&level.price)
            .map(|existing| existing.size)
            .unwrap_or(Decimal::ZERO);
        levels.insert(level.price, PriceLevel::new(level.price, level.size, prev_size));
    }

    fn side_mut(&mut self, side: Side) -> &mut BTreeMap<Decimal, PriceLevel> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    fn side(&self, side: Side) -> &BTreeMap<Decimal, PriceLevel> {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    /// Levels from the touch outwards: bids descending, asks ascending
    pub fn levels(&self, side: Side) -> Box<dyn Iterator<Item = &PriceLevel> + '_> {
        match side {
            Side::Bid => Box::new(self.bids.values().rev()),
            Side::Ask => Box::new(self.asks.values()),
        }
    }

    /// Level at an exact price
    pub fn level(&self, side: Side, price: Decimal) -> Option<&PriceLevel> {
        self.side(side).get(&price)
    }

    /// Number of resting levels on a side
    pub fn depth(&self, side: Side) -> usize {
        self.side(side).len()
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.last_key_value().map(|(p, _)| *p)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first_key_value().map(|(p, _)| *p)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn last_update_timestamp(&self) -> u64 {
        self.last_update_timestamp
    }
}
