//! Feed connection manager
//!
//! Owns a single streaming connection for a fixed set of topics: open,
//! subscribe, receive, close, and fixed-interval reconnect. All state is
//! mutated from one task; callers talk to it through a [`FeedHandle`].

use serde::Serialize;
use serde_json::Value;
use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Sleep};
use tracing::{debug, info, trace, warn};

use super::transport::{Connector, FeedStream};
use crate::error::Result;
use crate::metrics::FeedMetrics;
use crate::parser::SubscribeRequest;

/// Automatic reconnects allowed after consecutive closes
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
/// Fixed delay between a close and the next automatic attempt
pub const RECONNECT_DELAY_MS: u64 = 3000;

/// Connection settings
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub endpoint: String,
    pub topics: Vec<String>,
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            endpoint: "wss://ws.btse.com/ws/oss/futures".to_string(),
            topics: Vec::new(),
            auto_reconnect: true,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            reconnect_delay: Duration::from_millis(RECONNECT_DELAY_MS),
        }
    }
}

/// Lifecycle of the transport handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
}

#[derive(Debug)]
enum FeedCommand {
    Connect,
    Disconnect,
    ForceReconnect,
    Shutdown,
}

/// Control surface of a feed connection
#[cfg_attr(test, mockall::automock)]
pub trait FeedControl: Send {
    /// Open the connection unless it is already connecting or open
    fn connect(&self);

    /// Cancel any pending reconnect, close the connection and reset the
    /// retry counter. Idempotent.
    fn disconnect(&self);

    /// Drop the live connection and retry counter, then open a fresh one
    fn force_reconnect(&self);
}

/// Cloneable handle to a running [`FeedConnection`]
#[derive(Debug, Clone)]
pub struct FeedHandle {
    commands: mpsc::UnboundedSender<FeedCommand>,
    attempts: watch::Receiver<u32>,
    state: watch::Receiver<ConnectionState>,
}

impl FeedHandle {
    /// Automatic reconnect attempts since the last successful open
    pub fn reconnect_attempts(&self) -> u32 {
        *self.attempts.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stop the connection task; the connection is closed on the way out
    pub fn shutdown(&self) {
        self.send(FeedCommand::Shutdown);
    }

    fn send(&self, command: FeedCommand) {
        if self.commands.send(command).is_err() {
            debug!("Feed connection task already stopped");
        }
    }
}

impl FeedControl for FeedHandle {
    fn connect(&self) {
        self.send(FeedCommand::Connect);
    }

    fn disconnect(&self) {
        self.send(FeedCommand::Disconnect);
    }

    fn force_reconnect(&self) {
        self.send(FeedCommand::ForceReconnect);
    }
}

type ConnectFuture<S> = Pin<Box<dyn Future<Output = Result<S>> + Send>>;

/// Connection state machine, run as a single task
pub struct FeedConnection<C: Connector> {
    connector: Arc<C>,
    settings: FeedSettings,
    stream: Option<C::Stream>,
    connecting: Option<ConnectFuture<C::Stream>>,
    reconnect_timer: Option<Pin<Box<Sleep>>>,
    attempts: watch::Sender<u32>,
    state: watch::Sender<ConnectionState>,
    commands: mpsc::UnboundedReceiver<FeedCommand>,
    frames: mpsc::UnboundedSender<Value>,
    metrics: FeedMetrics,
}

impl<C: Connector> FeedConnection<C> {
    /// Create a connection together with its handle and the receiving end
    /// of the parsed-frame channel
    pub fn new(
        connector: C,
        settings: FeedSettings,
        metrics: FeedMetrics,
    ) -> (Self, FeedHandle, mpsc::UnboundedReceiver<Value>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (attempts_tx, attempts_rx) = watch::channel(0);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let connection = Self {
            connector: Arc::new(connector),
            settings,
            stream: None,
            connecting: None,
            reconnect_timer: None,
            attempts: attempts_tx,
            state: state_tx,
            commands: commands_rx,
            frames: frames_tx,
            metrics,
        };
        let handle = FeedHandle {
            commands: commands_tx,
            attempts: attempts_rx,
            state: state_rx,
        };

        (connection, handle, frames_rx)
    }

    /// Spawn the connection task
    pub fn spawn(
        connector: C,
        settings: FeedSettings,
        metrics: FeedMetrics,
    ) -> (FeedHandle, mpsc::UnboundedReceiver<Value>, JoinHandle<()>) {
        let (connection, handle, frames) = Self::new(connector, settings, metrics);
        let task = tokio::spawn(connection.run());
        (handle, frames, task)
    }

    /// Process commands, transport events and the reconnect timer until
    /// shutdown or until every handle is dropped
    pub async fn run(mut self) {
        info!(
            endpoint = %self.settings.endpoint,
            topics = ?self.settings.topics,
            "Starting feed connection"
        );

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(FeedCommand::Connect) => self.connect(),
                    Some(FeedCommand::Disconnect) => self.disconnect().await,
                    Some(FeedCommand::ForceReconnect) => self.force_reconnect().await,
                    Some(FeedCommand::Shutdown) | None => break,
                },
                result = opening(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_connect_result(result).await;
                }
                frame = next_frame(&mut self.stream) => match frame {
                    Ok(Some(text)) => self.on_frame(&text),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "Feed connection closed");
                        self.stream = None;
                        self.on_closed();
                    }
                },
                () = expired(&mut self.reconnect_timer) => {
                    self.reconnect_timer = None;
                    self.connect();
                }
            }
        }

        self.disconnect().await;
        info!("Feed connection stopped");
    }

    fn connect(&mut self) {
        if self.stream.is_some() || self.connecting.is_some() {
            debug!("Connect ignored, connection already active");
            return;
        }

        self.reconnect_timer = None;
        let connector = self.connector.clone();
        let endpoint = self.settings.endpoint.clone();
        let future: ConnectFuture<C::Stream> =
            Box::pin(async move { connector.connect(&endpoint).await });
        self.connecting = Some(future);
        self.state.send_replace(ConnectionState::Connecting);
    }

    async fn on_connect_result(&mut self, result: Result<C::Stream>) {
        let mut stream = match result {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Failed to open feed connection");
                self.on_closed();
                return;
            }
        };

        self.attempts.send_replace(0);
        self.metrics.connection_opens.inc();

        let subscribed = match SubscribeRequest::new(&self.settings.topics).to_json() {
            Ok(request) => stream.send_text(request).await,
            Err(e) => Err(e),
        };
        if let Err(e) = subscribed {
            warn!(error = %e, "Failed to send subscription");
            stream.close().await;
            self.on_closed();
            return;
        }

        info!(topics = ?self.settings.topics, "Feed connection open, subscribed");
        self.stream = Some(stream);
        self.state.send_replace(ConnectionState::Open);
    }

    /// Parse a text frame and forward it; malformed frames are dropped
    fn on_frame(&mut self, text: &str) {
        self.metrics.frames_received.inc();

        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                self.metrics.frames_malformed.inc();
                debug!(error = %e, len = text.len(), "Dropping malformed frame");
                return;
            }
        };

        if self.frames.send(value).is_err() {
            trace!("Frame receiver dropped");
        }
    }

    fn on_closed(&mut self) {
        self.state.send_replace(ConnectionState::Disconnected);

        let attempts = *self.attempts.borrow();
        if !self.settings.auto_reconnect {
            return;
        }
        if attempts >= self.settings.max_reconnect_attempts {
            warn!(attempts, "Reconnect attempts exhausted, staying disconnected");
            return;
        }

        let attempt = attempts + 1;
        self.attempts.send_replace(attempt);
        self.metrics.reconnects_scheduled.inc();
        info!(
            attempt,
            delay_ms = self.settings.reconnect_delay.as_millis() as u64,
            "Scheduling reconnect"
        );
        self.reconnect_timer = Some(Box::pin(sleep(self.settings.reconnect_delay)));
    }

    async fn disconnect(&mut self) {
        self.reconnect_timer = None;
        self.connecting = None;
        if let Some(mut stream) = self.stream.take() {
            stream.close().await;
            info!("Feed connection closed");
        }
        self.attempts.send_replace(0);
        self.state.send_replace(ConnectionState::Disconnected);
    }

    async fn force_reconnect(&mut self) {
        info!("Forcing feed reconnect");
        self.disconnect().await;
        self.connect();
    }
}

async fn opening<S>(connecting: &mut Option<ConnectFuture<S>>) -> Result<S> {
    match connecting {
        Some(future) => future.as_mut().await,
        None => pending().await,
    }
}

async fn next_frame<S: FeedStream>(stream: &mut Option<S>) -> Result<Option<String>> {
    match stream {
        Some(stream) => stream.recv().await,
        None => pending().await,
    }
}

async fn expired(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}
