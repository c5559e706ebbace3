//! Order book synchronizer
//!
//! Consumes parsed feed frames, keeps the authoritative book consistent
//! with the feed's sequence numbers, requests a resubscribe on gaps and
//! publishes debounced projections on a watch channel.

use serde_json::Value;
use std::future::pending;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};

use super::{BookView, Debounce, DisplayTracker, OrderBook};
use crate::error::SyncError;
use crate::metrics::FeedMetrics;
use crate::parser::{BookUpdate, ParsedMessage};
use crate::websocket::FeedControl;

/// Levels shown per side unless configured otherwise
pub const DEFAULT_MAX_LEVELS: usize = 8;
/// Debounce window for delta-driven projections
pub const DISPLAY_INTERVAL_MS: u64 = 3000;

/// Synchronizer settings
#[derive(Debug, Clone)]
pub struct BookSettings {
    /// Topic prefix of the book channel
    pub topic: String,
    pub max_levels: usize,
    pub display_interval: Duration,
}

impl BookSettings {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            max_levels: DEFAULT_MAX_LEVELS,
            display_interval: Duration::from_millis(DISPLAY_INTERVAL_MS),
        }
    }
}

/// What handling one message did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Book rebuilt and projected immediately
    SnapshotApplied,
    /// Delta merged; `projection_scheduled` is true if it opened a new window
    DeltaApplied { projection_scheduled: bool },
    /// Delta did not continue the sequence; a resubscribe was requested
    GapDetected { expected: u64, got: u64 },
    /// Delta dropped while uninitialized or waiting for a resync snapshot
    Discarded,
    /// Not a book message for this synchronizer
    Ignored,
}

#[derive(Debug)]
enum SyncCommand {
    Connect,
    Disconnect,
    Shutdown,
}

/// Authoritative book state plus projection scheduling
pub struct OrderBookSynchronizer<F: FeedControl> {
    feed: F,
    topic: String,
    book: OrderBook,
    display: DisplayTracker,
    debounce: Debounce,
    /// Set after a gap; cleared by the next snapshot
    resync_pending: bool,
    revision: u64,
    view: watch::Sender<BookView>,
    metrics: FeedMetrics,
}

impl<F: FeedControl> OrderBookSynchronizer<F> {
    pub fn new(feed: F, settings: BookSettings, metrics: FeedMetrics) -> Self {
        let (view, _) = watch::channel(BookView::default());
        Self {
            feed,
            topic: settings.topic,
            book: OrderBook::new(),
            display: DisplayTracker::new(settings.max_levels),
            debounce: Debounce::new(settings.display_interval),
            resync_pending: false,
            revision: 0,
            view,
            metrics,
        }
    }

    /// Receiver for emitted projections
    pub fn subscribe(&self) -> watch::Receiver<BookView> {
        self.view.subscribe()
    }

    /// Last emitted projection
    pub fn view(&self) -> BookView {
        self.view.borrow().clone()
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn debounce(&self) -> &Debounce {
        &self.debounce
    }

    pub fn is_resync_pending(&self) -> bool {
        self.resync_pending
    }

    pub fn connect(&self) {
        self.feed.connect();
    }

    /// Cancel the pending projection and disconnect the feed. Idempotent.
    pub fn disconnect(&mut self) {
        if self.debounce.cancel() {
            debug!("Pending projection cancelled");
        }
        self.feed.disconnect();
    }

    /// Handle one decoded frame from the feed connection.
    ///
    /// Payloads that fail to parse are counted and dropped here.
    pub fn handle_frame(&mut self, frame: Value, now: Instant) -> MessageOutcome {
        match ParsedMessage::from_value(frame) {
            Ok(ParsedMessage::Book(message)) if message.topic.starts_with(&self.topic) => {
                self.on_message(&message.update, now)
            }
            Ok(ParsedMessage::Book(message)) => {
                trace!(topic = %message.topic, "Ignoring book message for another topic");
                MessageOutcome::Ignored
            }
            Ok(ParsedMessage::Unknown(msg)) => {
                trace!(msg = %msg, "Unknown message type");
                MessageOutcome::Ignored
            }
            Err(e) => {
                self.metrics.payloads_rejected.inc();
                debug!(error = %e, "Dropping malformed book payload");
                MessageOutcome::Ignored
            }
        }
    }

    /// Apply a snapshot or delta
    pub fn on_message(&mut self, update: &BookUpdate, now: Instant) -> MessageOutcome {
        if update.rejected_levels > 0 {
            self.metrics.levels_rejected.inc_by(update.rejected_levels as u64);
            debug!(
                rejected = update.rejected_levels,
                seq_num = update.seq_num,
                "Skipped non-numeric levels"
            );
        }

        if update.is_snapshot() {
            self.on_snapshot(update)
        } else {
            self.on_delta(update, now)
        }
    }

    fn on_snapshot(&mut self, snapshot: &BookUpdate) -> MessageOutcome {
        self.book.apply_snapshot(snapshot);
        self.metrics.snapshots_applied.inc();

        if self.resync_pending {
            info!(seq_num = snapshot.seq_num, "Resynchronized from snapshot");
            self.resync_pending = false;
        } else {
            debug!(seq_num = snapshot.seq_num, "Snapshot applied");
        }

        self.debounce.cancel();
        self.emit_projection();
        MessageOutcome::SnapshotApplied
    }

    fn on_delta(&mut self, delta: &BookUpdate, now: Instant) -> MessageOutcome {
        if self.resync_pending {
            self.metrics.deltas_discarded.inc();
            trace!(seq_num = delta.seq_num, "Discarding delta while awaiting snapshot");
            return MessageOutcome::Discarded;
        }

        match self.book.apply_delta(delta) {
            Ok(()) => {
                self.metrics.deltas_applied.inc();
                self.publish_sequence();
                let projection_scheduled = self.debounce.schedule(now);
                MessageOutcome::DeltaApplied {
                    projection_scheduled,
                }
            }
            Err(SyncError::SequenceGap { expected, got }) => {
                self.metrics.sequence_gaps.inc();
                self.metrics.deltas_discarded.inc();
                warn!(
                    expected,
                    got,
                    seq_num = delta.seq_num,
                    "Sequence gap detected, resubscribing"
                );
                self.resync_pending = true;
                self.feed.force_reconnect();
                MessageOutcome::GapDetected { expected, got }
            }
            Err(e) => {
                self.metrics.deltas_discarded.inc();
                debug!(error = %e, seq_num = delta.seq_num, "Discarding delta");
                MessageOutcome::Discarded
            }
        }
    }

    /// Run the debounced projection if its window has closed.
    ///
    /// Returns true if a projection was emitted.
    pub fn on_timer(&mut self, now: Instant) -> bool {
        if !self.debounce.fire(now) {
            return false;
        }
        self.emit_projection();
        true
    }

    /// Refresh the view's sequence fields without re-projecting levels
    fn publish_sequence(&self) {
        let sequence_number = self.book.sequence_number();
        let last_update_timestamp = self.book.last_update_timestamp();
        self.view.send_modify(|view| {
            view.sequence_number = sequence_number;
            view.last_update_timestamp = last_update_timestamp;
        });
    }

    fn emit_projection(&mut self) {
        self.revision += 1;
        let view = self.display.project(&self.book, self.revision);
        trace!(
            revision = view.revision,
            seq_num = view.sequence_number,
            bids = view.bids.len(),
            asks = view.asks.len(),
            "Projection emitted"
        );
        self.metrics.projections_emitted.inc();
        self.view.send_replace(view);
    }
}

impl<F: FeedControl + 'static> OrderBookSynchronizer<F> {
    /// Spawn the synchronizer on its own task, fed by the connection's
    /// frame channel
    pub fn spawn(self, frames: mpsc::UnboundedReceiver<Value>) -> SynchronizerHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let view = self.subscribe();
        let task = tokio::spawn(self.run(frames, commands_rx));

        SynchronizerHandle {
            commands: commands_tx,
            view,
            task,
        }
    }

    async fn run(
        mut self,
        mut frames: mpsc::UnboundedReceiver<Value>,
        mut commands: mpsc::UnboundedReceiver<SyncCommand>,
    ) {
        info!(topic = %self.topic, "Starting order book synchronizer");

        loop {
            let deadline = self.debounce.deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SyncCommand::Connect) => self.connect(),
                    Some(SyncCommand::Disconnect) => self.disconnect(),
                    Some(SyncCommand::Shutdown) | None => break,
                },
                frame = frames.recv() => match frame {
                    Some(frame) => {
                        self.handle_frame(frame, Instant::now());
                    }
                    None => {
                        info!("Feed frame channel closed");
                        break;
                    }
                },
                () = wait_until(deadline) => {
                    self.on_timer(Instant::now());
                }
            }
        }

        self.disconnect();
        info!("Order book synchronizer stopped");
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

/// Handle to a spawned synchronizer.
///
/// Dropping the handle stops the task, which cancels the pending projection
/// and disconnects the feed.
pub struct SynchronizerHandle {
    commands: mpsc::UnboundedSender<SyncCommand>,
    view: watch::Receiver<BookView>,
    task: JoinHandle<()>,
}

impl SynchronizerHandle {
    pub fn connect(&self) {
        self.send(SyncCommand::Connect);
    }

    pub fn disconnect(&self) {
        self.send(SyncCommand::Disconnect);
    }

    /// Last emitted projection
    pub fn view(&self) -> BookView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BookView> {
        self.view.clone()
    }

    /// Stop the task and wait for teardown to finish
    pub async fn shutdown(self) {
        self.send(SyncCommand::Shutdown);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Synchronizer task failed");
        }
    }

    fn send(&self, command: SyncCommand) {
        if self.commands.send(command).is_err() {
            debug!("Synchronizer task already stopped");
        }
    }
}
