//! Publisher module for IPC communication
//!
//! Forwards emitted book projections to a local consumer over a Unix socket.
//! Frames are a big-endian u32 length followed by a MessagePack `BookView`.

use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::orderbook::BookView;

/// Publisher for sending book projections via Unix socket
pub struct Publisher {
    socket_path: String,
    stream: Mutex<Option<UnixStream>>,
}

impl Publisher {
    /// Create a new publisher; the socket may not exist yet
    pub async fn new(socket_path: &str) -> Self {
        let publisher = Self {
            socket_path: socket_path.to_string(),
            stream: Mutex::new(None),
        };

        if let Err(e) = publisher.connect().await {
            warn!(error = %e, "Initial IPC connection failed, will retry on publish");
        }

        publisher
    }

    async fn connect(&self) -> Result<()> {
        let path = Path::new(&self.socket_path);

        if !path.exists() {
            return Err(SyncError::IpcError(format!(
                "Socket path does not exist: {}",
                self.socket_path
            )));
        }

        let stream = UnixStream::connect(path).await.map_err(|e| {
            SyncError::IpcError(format!("Failed to connect to {}: {}", self.socket_path, e))
        })?;

        *self.stream.lock().await = Some(stream);

        info!(path = %self.socket_path, "Connected to IPC socket");
        Ok(())
    }

    /// Encode a projection as a length-prefixed MessagePack frame
    pub fn encode(view: &BookView) -> Result<Vec<u8>> {
        let data = rmp_serde::to_vec_named(view)?;
        let len = u32::try_from(data.len())
            .map_err(|_| SyncError::SerializationError("projection too large".to_string()))?;

        let mut message = Vec::with_capacity(4 + data.len());
        message.extend_from_slice(&len.to_be_bytes());
        message.extend_from_slice(&data);
        Ok(message)
    }

    /// Publish one projection.
    ///
    /// Socket failures are logged and the connection is retried on the next
    /// call; only encoding errors are returned.
    pub async fn publish(&self, view: &BookView) -> Result<()> {
        let message = Self::encode(view)?;

        let mut guard = self.stream.lock().await;
        if guard.is_none() {
            drop(guard);
            if let Err(e) = self.connect().await {
                debug!(error = %e, "Failed to reconnect to IPC socket");
                return Ok(());
            }
            guard = self.stream.lock().await;
        }

        if let Some(stream) = guard.as_mut() {
            match stream.write_all(&message).await {
                Ok(()) => {
                    debug!(
                        revision = view.revision,
                        seq_num = view.sequence_number,
                        "Published book projection"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "Failed to write to IPC socket");
                    *guard = None;
                }
            }
        }

        Ok(())
    }

    /// Publish every projection seen on `views` until the sender is dropped
    pub async fn run(self, mut views: watch::Receiver<BookView>) {
        while views.changed().await.is_ok() {
            let view = views.borrow_and_update().clone();
            if let Err(e) = self.publish(&view).await {
                warn!(error = %e, "Failed to publish projection");
            }
        }
        debug!("Projection channel closed, publisher exiting");
    }
}
