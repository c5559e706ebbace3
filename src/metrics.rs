//! Prometheus counters for the feed connection and synchronizer

use prometheus::{IntCounter, Registry};

use crate::error::Result;

/// Counters shared by the feed connection and the synchronizer.
///
/// Cloning is cheap; clones update the same underlying counters.
#[derive(Debug, Clone)]
pub struct FeedMetrics {
    pub frames_received: IntCounter,
    pub frames_malformed: IntCounter,
    pub connection_opens: IntCounter,
    pub reconnects_scheduled: IntCounter,
    pub snapshots_applied: IntCounter,
    pub deltas_applied: IntCounter,
    pub deltas_discarded: IntCounter,
    pub sequence_gaps: IntCounter,
    pub payloads_rejected: IntCounter,
    pub levels_rejected: IntCounter,
    pub projections_emitted: IntCounter,
}

impl FeedMetrics {
    /// Create unregistered counters
    pub fn new() -> Result<Self> {
        Ok(Self {
            frames_received: IntCounter::new(
                "book_feed_frames_received_total",
                "Frames received from the feed",
            )?,
            frames_malformed: IntCounter::new(
                "book_feed_frames_malformed_total",
                "Frames dropped because they were not valid JSON",
            )?,
            connection_opens: IntCounter::new(
                "book_feed_connection_opens_total",
                "Successful feed connection opens",
            )?,
            reconnects_scheduled: IntCounter::new(
                "book_feed_reconnects_scheduled_total",
                "Automatic reconnects scheduled after a close",
            )?,
            snapshots_applied: IntCounter::new(
                "book_sync_snapshots_applied_total",
                "Snapshots applied to the book",
            )?,
            deltas_applied: IntCounter::new(
                "book_sync_deltas_applied_total",
                "Deltas merged into the book",
            )?,
            deltas_discarded: IntCounter::new(
                "book_sync_deltas_discarded_total",
                "Deltas discarded without merging",
            )?,
            sequence_gaps: IntCounter::new(
                "book_sync_sequence_gaps_total",
                "Sequence gaps that forced a resubscribe",
            )?,
            payloads_rejected: IntCounter::new(
                "book_sync_payloads_rejected_total",
                "Book payloads rejected for an invalid shape",
            )?,
            levels_rejected: IntCounter::new(
                "book_sync_levels_rejected_total",
                "Price levels skipped for non-numeric price or size",
            )?,
            projections_emitted: IntCounter::new(
                "book_sync_projections_emitted_total",
                "Display projections emitted",
            )?,
        })
    }

    /// Register every counter with a registry
    pub fn register(&self, registry: &Registry) -> Result<()> {
        for counter in [
            &self.frames_received,
            &self.frames_malformed,
            &self.connection_opens,
            &self.reconnects_scheduled,
            &self.snapshots_applied,
            &self.deltas_applied,
            &self.deltas_discarded,
            &self.sequence_gaps,
            &self.payloads_rejected,
            &self.levels_rejected,
            &self.projections_emitted,
        ] {
            registry.register(Box::new(counter.clone()))?;
        }
        Ok(())
    }
}
