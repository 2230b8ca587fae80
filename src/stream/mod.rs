use thiserror::Error;

pub mod assembler;
pub mod mock;
pub mod websocket;

/// One inbound unit, tagged by the wire form the transport delivered it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamPayload {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Opened,
    Closed(String),
    Failed(ConnectionError),
    MessageReceived(StreamPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("handshake with {url} failed: {reason}")]
    Handshake { url: String, reason: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("connection already open")]
    AlreadyConnected,
}

/// Source of streaming connection events.
///
/// Implemented by the WebSocket [`websocket::ConnectionManager`] and by the
/// scripted [`mock::ScriptedFeed`] used in tests.
#[allow(async_fn_in_trait)]
pub trait EventFeed {
    /// Next event in arrival order, or `None` once the feed is exhausted.
    async fn next_event(&mut self) -> Option<ConnectionEvent>;

    /// Releases the underlying connection. Safe to call more than once.
    async fn close(&mut self);
}
