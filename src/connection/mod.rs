//! Lifecycle of the persistent channel to the conversation service.
//!
//! A [`ConnectionManager`] owns one background driver task that walks the
//! state machine
//!
//! ```text
//! Idle -> Connecting -> Connected -> Reconnecting -> Connecting -> ...
//!                                         \-> Closed (retries exhausted)
//! any state -> Closed (close)
//! ```
//!
//! and reports what happens through a [`ConnectionEvent`] stream. `Closed` is
//! terminal; a new session needs a new manager.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::InboundFrame;
use crate::core::config::defaults::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_CEILING_MS, DEFAULT_CONNECT_TIMEOUT_MS,
    DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_HEARTBEAT_TIMEOUT_MS, DEFAULT_MAX_RECONNECT_ATTEMPTS,
    DEFAULT_OUTBOUND_BUFFER,
};
use crate::core::error::DisconnectReason;
use crate::transport::Connector;

pub mod backoff;
mod driver;


pub use backoff::Backoff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        }
    }
}

/// Everything the manager reports to its owner, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected(DisconnectReason),
    /// One decoded inbound frame, in wire order.
    Message(InboundFrame),
    /// A non-fatal problem worth surfacing (undecodable frame and similar).
    Error(String),
}

#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub max_reconnect_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_ceiling: Duration,
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    /// Frames that may wait for the driver before `send` fails fast.
    pub outbound_buffer: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            backoff_ceiling: Duration::from_millis(DEFAULT_BACKOFF_CEILING_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            heartbeat_timeout: Duration::from_millis(DEFAULT_HEARTBEAT_TIMEOUT_MS),
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }
}

/// `send` was attempted while the channel could not take the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("not connected")]
pub struct NotConnected;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OpenError {
    #[error("connection was already opened")]
    AlreadyOpened,
    #[error("connection is closed")]
    Closed,
}

/// Non-blocking outlet for encoded frames.
///
/// Implemented by [`ConnectionManager`]; the outbound dispatcher only needs
/// this much of it.
pub trait FrameSink {
    fn try_send(&self, payload: String) -> Result<(), NotConnected>;
}

/// State shared between the handle and the driver.
///
/// `epoch` increases on every connect attempt so frames queued for a channel
/// that has since been lost are never written to its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LinkState {
    pub(crate) state: ConnectionState,
    pub(crate) epoch: u64,
}

pub(crate) struct QueuedFrame {
    pub(crate) epoch: u64,
    pub(crate) payload: String,
}

pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    link: Arc<watch::Sender<LinkState>>,
    outbound: OnceLock<mpsc::Sender<QueuedFrame>>,
    cancel: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
    /// Serializes `close` so every caller returns only after teardown.
    closing: AsyncMutex<()>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        let (link, _) = watch::channel(LinkState {
            state: ConnectionState::Idle,
            epoch: 0,
        });
        Self {
            connector,
            link: Arc::new(link),
            outbound: OnceLock::new(),
            cancel: CancellationToken::new(),
            driver: Mutex::new(None),
            closing: AsyncMutex::new(()),
        }
    }

    /// Starts connecting in the background and returns the event stream.
    ///
    /// Only valid once, from `Idle`. Must be called within a tokio runtime.
    pub fn open(
        &self,
        endpoint: impl Into<String>,
        options: ConnectionOptions,
    ) -> Result<mpsc::UnboundedReceiver<ConnectionEvent>, OpenError> {
        match self.state() {
            ConnectionState::Idle => {}
            ConnectionState::Closed => return Err(OpenError::Closed),
            _ => return Err(OpenError::AlreadyOpened),
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(options.outbound_buffer.max(1));
        if self.outbound.set(outbound_tx).is_err() {
            return Err(OpenError::AlreadyOpened);
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let endpoint = endpoint.into();
        debug!(endpoint = %endpoint, "Opening connection");

        let driver = driver::Driver::new(
            endpoint,
            options,
            Arc::clone(&self.connector),
            Arc::clone(&self.link),
            outbound_rx,
            events_tx,
            self.cancel.clone(),
        );
        let handle = tokio::spawn(driver.run());
        *self.driver.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(events_rx)
    }

    pub fn state(&self) -> ConnectionState {
        self.link.borrow().state
    }

    /// Queues `payload` for the live channel without waiting.
    ///
    /// Fails with [`NotConnected`] unless the state is `Connected` and the
    /// outbound buffer has room.
    pub fn send(&self, payload: String) -> Result<(), NotConnected> {
        let link = *self.link.borrow();
        if link.state != ConnectionState::Connected {
            return Err(NotConnected);
        }
        let outbound = self.outbound.get().ok_or(NotConnected)?;
        outbound
            .try_send(QueuedFrame {
                epoch: link.epoch,
                payload,
            })
            .map_err(|_| NotConnected)
    }

    /// Tears the connection down from any state.
    ///
    /// Cancels a pending connect attempt or reconnect timer, releases the
    /// channel and waits for the driver to finish. No events are emitted once
    /// this returns. Calling it again is a no-op; a concurrent caller waits
    /// for the close already in progress.
    pub async fn close(&self) {
        self.cancel.cancel();
        let _closing = self.closing.lock().await;
        let handle = self
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(error = %err, "Connection driver ended abnormally");
            }
        }
        self.link.send_if_modified(|link| {
            if link.state == ConnectionState::Closed {
                return false;
            }
            link.state = ConnectionState::Closed;
            true
        });
    }
}

impl FrameSink for ConnectionManager {
    fn try_send(&self, payload: String) -> Result<(), NotConnected> {
        self.send(payload)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
