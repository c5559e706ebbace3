//! Transport seam between the connection state machine and the network

use std::future::Future;

use crate::error::Result;

/// Opens connections to a feed endpoint
pub trait Connector: Send + Sync + 'static {
    type Stream: FeedStream;

    /// Make one attempt to open a connection
    fn connect(&self, endpoint: &str) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// An open, message-oriented connection
pub trait FeedStream: Send + 'static {
    /// Send a text frame
    fn send_text(&mut self, text: String) -> impl Future<Output = Result<()>> + Send;

    /// Receive the next frame.
    ///
    /// `Ok(Some(text))` is a data frame, `Ok(None)` a control frame that
    /// needs no further handling. `Err` means the connection is gone.
    fn recv(&mut self) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Close the connection
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}
