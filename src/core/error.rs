//! Error taxonomy shared by the connection, dispatcher and session layers.
//!
//! Only [`SendError`] and the fatal [`DisconnectReason::RetriesExhausted`]
//! cross the public session API. Transport failures stay inside the
//! reconnect loop and bootstrap failures are reported as events.

use std::fmt;

use thiserror::Error;

use crate::core::message::EntryId;

/// Errors returned to the caller of `send`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// Blank or whitespace-only input. Nothing was appended.
    #[error("message is empty")]
    EmptyMessage,

    /// The channel was not connected or could not take the frame right now.
    ///
    /// When the text had already been appended, `id` names the entry, which
    /// is now `Failed`.
    #[error("not connected to the conversation service")]
    NotConnected { id: Option<EntryId> },
}

/// Why the connection left `Connected` (or never reached it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    Timeout,
    TransportError,
    ExplicitClose,
    RetriesExhausted,
}

impl DisconnectReason {
    pub fn is_fatal(self) -> bool {
        self == DisconnectReason::RetriesExhausted
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DisconnectReason::Timeout => "timeout",
            DisconnectReason::TransportError => "transport error",
            DisconnectReason::ExplicitClose => "closed",
            DisconnectReason::RetriesExhausted => "retries exhausted",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single connect attempt or of a live channel.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    #[error("connection lost: {0}")]
    Io(String),

    #[error("peer closed the connection")]
    Closed,
}

/// An inbound frame that could not be turned into an event.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty frame")]
    Empty,

    #[error("invalid frame {frame}: {source}")]
    Invalid {
        frame: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported frame shape: {0}")]
    Unsupported(String),

    #[error("binary frame is not valid UTF-8")]
    NotUtf8,
}

/// Failure of the one-shot bootstrap request. Never fatal to a session.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("bootstrap request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("bootstrap returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("bootstrap rejected: {0}")]
    Rejected(String),

    #[error("invalid bootstrap URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
}
