// End-to-end synchronizer flow over an in-memory transport
//
// Feed connection → synchronizer → projection channel, with paused tokio
// time so reconnect delays and the display window are exact.
//
// Run with: cargo test --test sync_flow_test

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rust_decimal_macros::dec;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;

use orderbook_sync::{
    BookSettings, ConnectionState, Connector, FeedConnection, FeedMetrics, FeedSettings,
    FeedStream, OrderBookSynchronizer, Result, SyncError,
};

const TOPIC: &str = "update:BTCPFC_0";

// ============================================================================
// In-memory transport
// ============================================================================

struct MemoryStream {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<String>,
}

/// Server side of a [`MemoryStream`]
struct Peer {
    frames: mpsc::UnboundedSender<String>,
    sent: mpsc::UnboundedReceiver<String>,
}

impl FeedStream for MemoryStream {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.outbound
            .send(text)
            .map_err(|e| SyncError::WebSocketMessage(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        self.inbound
            .recv()
            .await
            .map(Some)
            .ok_or_else(|| SyncError::WebSocketConnection("peer closed".to_string()))
    }

    async fn close(&mut self) {
        self.inbound.close();
    }
}

#[derive(Clone, Default)]
struct MemoryConnector {
    streams: Arc<Mutex<VecDeque<MemoryStream>>>,
    attempts: Arc<Mutex<Vec<Instant>>>,
}

impl MemoryConnector {
    fn accept_next(&self) -> Peer {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        self.streams.lock().unwrap().push_back(MemoryStream {
            inbound: frames_rx,
            outbound: sent_tx,
        });
        Peer {
            frames: frames_tx,
            sent: sent_rx,
        }
    }

    fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }
}

impl Connector for MemoryConnector {
    type Stream = MemoryStream;

    async fn connect(&self, _endpoint: &str) -> Result<MemoryStream> {
        self.attempts.lock().unwrap().push(Instant::now());
        self.streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| SyncError::WebSocketConnection("connection refused".to_string()))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn feed_settings() -> FeedSettings {
    FeedSettings {
        endpoint: "memory://feed".to_string(),
        topics: vec![TOPIC.to_string()],
        ..FeedSettings::default()
    }
}

fn snapshot_frame(seq_num: u64) -> String {
    json!({
        "topic": TOPIC,
        "data": {
            "type": "snapshot",
            "bids": [["100.0", "5"], ["99.5", "3"]],
            "asks": [["100.5", "2"]],
            "seqNum": seq_num,
            "prevSeqNum": 0,
            "timestamp": 1_700_000_000_000u64
        }
    })
    .to_string()
}

fn delta_frame(prev_seq_num: u64, seq_num: u64, bids: serde_json::Value) -> String {
    json!({
        "topic": TOPIC,
        "data": {
            "type": "delta",
            "bids": bids,
            "asks": [],
            "seqNum": seq_num,
            "prevSeqNum": prev_seq_num,
            "timestamp": 1_700_000_000_000u64 + seq_num
        }
    })
    .to_string()
}

fn assert_subscribe(text: &str) {
    let request: serde_json::Value = serde_json::from_str(text).unwrap();
    assert_eq!(request, json!({"op": "subscribe", "args": [TOPIC]}));
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_snapshot_gap_resync_and_debounced_delta() {
    let connector = MemoryConnector::default();
    let mut first = connector.accept_next();
    let mut second = connector.accept_next();

    let metrics = FeedMetrics::new().unwrap();
    let (feed, frames, feed_task) =
        FeedConnection::spawn(connector.clone(), feed_settings(), metrics.clone());
    let sync = OrderBookSynchronizer::new(feed.clone(), BookSettings::new(TOPIC), metrics.clone())
        .spawn(frames);
    let mut views = sync.subscribe();

    sync.connect();
    assert_subscribe(&first.sent.recv().await.unwrap());
    feed.watch_state()
        .wait_for(|s| *s == ConnectionState::Open)
        .await
        .unwrap();

    // snapshot is projected without waiting for the display window
    first.frames.send(snapshot_frame(10)).unwrap();
    views.changed().await.unwrap();
    {
        let view = views.borrow_and_update();
        assert!(view.is_initialized);
        assert_eq!(view.sequence_number, 10);
        let bids: Vec<_> = view
            .bids
            .iter()
            .map(|l| (l.price, l.size, l.cumulative_total))
            .collect();
        assert_eq!(
            bids,
            vec![(dec!(100.0), dec!(5), dec!(5)), (dec!(99.5), dec!(3), dec!(8))]
        );
        assert_eq!(view.asks.len(), 1);
        assert_eq!(view.asks[0].cumulative_total, dec!(2));
    }

    // a gap drops the delta and resubscribes on a fresh connection
    first
        .frames
        .send(delta_frame(5, 6, json!([["100.0", "0"]])))
        .unwrap();
    assert_subscribe(&second.sent.recv().await.unwrap());
    assert!(first.sent.recv().await.is_none());
    assert_eq!(metrics.sequence_gaps.get(), 1);
    assert_eq!(sync.view().bids.len(), 2);
    assert_eq!(connector.attempts().len(), 2);

    second.frames.send(snapshot_frame(50)).unwrap();
    views.changed().await.unwrap();
    assert_eq!(views.borrow_and_update().sequence_number, 50);

    // levels changed by a delta wait for the display window
    let start = Instant::now();
    second
        .frames
        .send(delta_frame(50, 51, json!([["100.0", "0"]])))
        .unwrap();

    // the sequence is published as soon as the delta is merged
    views.changed().await.unwrap();
    assert_eq!(Instant::now(), start);
    {
        let view = views.borrow_and_update();
        assert_eq!(view.sequence_number, 51);
        assert_eq!(view.revision, 2);
        assert_eq!(view.bids.len(), 2);
    }

    views.wait_for(|v| v.revision == 3).await.unwrap();
    assert_eq!(Instant::now() - start, Duration::from_millis(3000));
    {
        let view = views.borrow_and_update();
        assert_eq!(view.sequence_number, 51);
        assert_eq!(view.bids.len(), 1);
        assert_eq!(view.bids[0].price, dec!(99.5));
        assert_eq!(view.bids[0].cumulative_total, dec!(3));
        assert_eq!(view.max_bid_total, dec!(3));
    }

    sync.shutdown().await;
    feed.shutdown();
    feed_task.await.unwrap();
    assert_eq!(feed.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_reconnects_are_capped_at_fixed_interval() {
    let connector = MemoryConnector::default();
    let first = connector.accept_next();

    let (feed, _frames, feed_task) =
        FeedConnection::spawn(connector.clone(), feed_settings(), FeedMetrics::new().unwrap());
    let sync = OrderBookSynchronizer::new(
        feed.clone(),
        BookSettings::new(TOPIC),
        FeedMetrics::new().unwrap(),
    );
    sync.connect();

    let mut state = feed.watch_state();
    state
        .wait_for(|s| *s == ConnectionState::Open)
        .await
        .unwrap();

    // server goes away; every retry is refused
    drop(first);
    tokio::time::sleep(Duration::from_secs(60)).await;

    let attempts = connector.attempts();
    assert_eq!(attempts.len(), 6);
    for pair in attempts[1..].windows(2) {
        assert_eq!(pair[1] - pair[0], Duration::from_millis(3000));
    }
    assert_eq!(feed.reconnect_attempts(), 5);
    assert_eq!(feed.state(), ConnectionState::Disconnected);

    feed.shutdown();
    feed_task.await.unwrap();
}
