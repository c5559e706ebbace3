//! Feed connection: transport, reconnect policy and frame delivery

mod client;
mod connection;
mod transport;

pub use client::{TungsteniteConnector, WebSocketClient};
pub use connection::{
    ConnectionState, FeedConnection, FeedControl, FeedHandle, FeedSettings,
    MAX_RECONNECT_ATTEMPTS, RECONNECT_DELAY_MS,
};
pub use transport::{Connector, FeedStream};

#[cfg(test)]
pub use connection::MockFeedControl;
