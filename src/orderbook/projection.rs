//! Bounded-depth display projection

use rust_decimal::Decimal;
use std::collections::HashSet;

use super::{BookView, OrderBook, PriceLevel, Side};

/// Builds projections and remembers which prices the last one displayed
#[derive(Debug, Clone)]
pub struct DisplayTracker {
    max_levels: usize,
    bid_prices: HashSet<Decimal>,
    ask_prices: HashSet<Decimal>,
}

impl DisplayTracker {
    pub fn new(max_levels: usize) -> Self {
        Self {
            max_levels,
            bid_prices: HashSet::with_capacity(max_levels),
            ask_prices: HashSet::with_capacity(max_levels),
        }
    }

    pub fn max_levels(&self) -> usize {
        self.max_levels
    }

    /// Project the top `max_levels` of each side.
    ///
    /// Bids come out highest first, asks deepest first, so both read top
    /// to bottom as a price ladder. The displayed price sets are replaced.
    pub fn project(&mut self, book: &OrderBook, revision: u64) -> BookView {
        let (bids, bid_prices, max_bid_total) =
            annotate(book, Side::Bid, self.max_levels, &self.bid_prices);
        let (mut asks, ask_prices, max_ask_total) =
            annotate(book, Side::Ask, self.max_levels, &self.ask_prices);
        asks.reverse();

        self.bid_prices = bid_prices;
        self.ask_prices = ask_prices;

        BookView {
            bids,
            asks,
            sequence_number: book.sequence_number(),
            last_update_timestamp: book.last_update_timestamp(),
            is_initialized: book.is_initialized(),
            max_bid_total,
            max_ask_total,
            revision,
        }
    }
}

/// Take levels from the touch, accumulate totals and flag prices that were
/// not displayed last time
fn annotate(
    book: &OrderBook,
    side: Side,
    max_levels: usize,
    displayed: &HashSet<Decimal>,
) -> (Vec<PriceLevel>, HashSet<Decimal>, Decimal) {
    let mut total = Decimal::ZERO;
    let mut prices = HashSet::with_capacity(max_levels);

    let levels: Vec<PriceLevel> = book
        .levels(side)
        .take(max_levels)
        .map(|level| {
            total += level.size;
            prices.insert(level.price);
            PriceLevel {
                cumulative_total: total,
                is_new_in_display: !displayed.contains(&level.price),
                ..level.clone()
            }
        })
        .collect();

    (levels, prices, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{BookUpdate, LevelUpdate, UpdateKind};
    use rust_decimal_macros::dec;

    fn levels(pairs: &[(Decimal, Decimal)]) -> Vec<LevelUpdate> {
        pairs
            .iter()
            .map(|&(price, size)| LevelUpdate { price, size })
            .collect()
    }

    fn snapshot(bids: &[(Decimal, Decimal)], asks: &[(Decimal, Decimal)]) -> BookUpdate {
        BookUpdate {
            kind: UpdateKind::Snapshot,
            bids: levels(bids),
            asks: levels(asks),
            seq_num: 1,
            prev_seq_num: 0,
            timestamp: 0,
            rejected_levels: 0,
        }
    }

    fn delta(seq_num: u64, bids: &[(Decimal, Decimal)], asks: &[(Decimal, Decimal)]) -> BookUpdate {
        BookUpdate {
            kind: UpdateKind::Delta,
            bids: levels(bids),
            asks: levels(asks),
            seq_num,
            prev_seq_num: seq_num - 1,
            timestamp: 0,
            rejected_levels: 0,
        }
    }

    #[test]
    fn test_depth_bound_and_ordering() {
        let mut book = OrderBook::new();
        let bids: Vec<_> = (0..20).map(|i| (Decimal::from(100 - i), dec!(1))).collect();
        let asks: Vec<_> = (0..20).map(|i| (Decimal::from(101 + i), dec!(2))).collect();
        book.apply_snapshot(&snapshot(&bids, &asks));

        let view = DisplayTracker::new(8).project(&book, 1);

        assert_eq!(view.bids.len(), 8);
        assert_eq!(view.asks.len(), 8);
        assert_eq!(view.bids[0].price, dec!(100));
        assert_eq!(view.bids[7].price, dec!(93));
        assert_eq!(view.asks[0].price, dec!(108));
        assert_eq!(view.asks[7].price, dec!(101));
    }

    #[test]
    fn test_cumulative_totals() {
        let mut book = OrderBook::new();
        book.apply_snapshot(&snapshot(
            &[(dec!(100), dec!(5)), (dec!(99), dec!(3)), (dec!(98), dec!(1.5))],
            &[(dec!(101), dec!(2)), (dec!(102), dec!(4))],
        ));

        let view = DisplayTracker::new(8).project(&book, 1);

        let bid_totals: Vec<_> = view.bids.iter().map(|l| l.cumulative_total).collect();
        assert_eq!(bid_totals, vec![dec!(5), dec!(8), dec!(9.5)]);
        assert_eq!(view.max_bid_total, dec!(9.5));
        assert_eq!(view.bids.last().unwrap().cumulative_total, view.max_bid_total);

        // asks are emitted deepest first; the touch carries the smallest total
        assert_eq!(view.asks[0].price, dec!(102));
        assert_eq!(view.asks[0].cumulative_total, dec!(6));
        assert_eq!(view.asks[1].cumulative_total, dec!(2));
        assert_eq!(view.max_ask_total, dec!(6));
    }

    #[test]
    fn test_new_in_display_flags() {
        let mut book = OrderBook::new();
        book.apply_snapshot(&snapshot(
            &[(dec!(100), dec!(1)), (dec!(99), dec!(1))],
            &[(dec!(101), dec!(1))],
        ));
        let mut tracker = DisplayTracker::new(2);

        let first = tracker.project(&book, 1);
        assert!(first.bids.iter().all(|l| l.is_new_in_display));
        assert!(first.asks.iter().all(|l| l.is_new_in_display));

        // 99.5 pushes 99 out of the top two
        book.apply_delta(&delta(2, &[(dec!(99.5), dec!(1))], &[])).unwrap();
        let second = tracker.project(&book, 2);
        let flags: Vec<_> = second
            .bids
            .iter()
            .map(|l| (l.price, l.is_new_in_display))
            .collect();
        assert_eq!(flags, vec![(dec!(100), false), (dec!(99.5), true)]);
        assert!(!second.asks[0].is_new_in_display);

        // 99 re-enters after being dropped from the display
        book.apply_delta(&delta(3, &[(dec!(99.5), dec!(0))], &[])).unwrap();
        let third = tracker.project(&book, 3);
        assert!(third.bids[1].is_new_in_display);
        assert_eq!(third.bids[1].price, dec!(99));
    }

    #[test]
    fn test_empty_book_projects_zero_totals() {
        let book = OrderBook::new();
        let view = DisplayTracker::new(8).project(&book, 1);
        assert!(view.bids.is_empty());
        assert!(view.asks.is_empty());
        assert_eq!(view.max_bid_total, Decimal::ZERO);
        assert!(!view.is_initialized);
    }
}
