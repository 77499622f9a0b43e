//! Transport abstractions for the persistent conversation channel.
//!
//! The connection manager only sees [`Connector`] and [`Channel`], so its
//! state machine can be driven by the WebSocket implementation in production
//! and by an in-memory pair in tests.

use async_trait::async_trait;

use crate::core::error::TransportError;

pub mod websocket;

pub use websocket::WebSocketConnector;

/// One unit of traffic read from a live channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Text(String),
    Binary(Vec<u8>),
    /// Transport-level liveness traffic (ping or pong) with no payload.
    Heartbeat,
}

/// A live, message-framed connection.
#[async_trait]
pub trait Channel: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    async fn ping(&mut self) -> Result<(), TransportError>;

    /// Next inbound unit, or `None` once the peer has closed the channel.
    ///
    /// Must be cancel-safe: the connection driver races it against outbound
    /// traffic and timers.
    async fn recv(&mut self) -> Option<Result<Incoming, TransportError>>;

    /// Best-effort graceful shutdown. Dropping the channel releases it either way.
    async fn close(&mut self);
}

/// Opens channels to an endpoint. One call per connect attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Channel>, TransportError>;
}
