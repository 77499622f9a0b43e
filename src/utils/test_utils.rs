//! In-memory transport used by the connection and session tests.
//!
//! A [`ScriptedConnector`] answers each connect attempt from a script. Every
//! accepted attempt hands the test a [`ServerEnd`] that plays the service side
//! of the channel.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::error::TransportError;
use crate::transport::{Channel, Connector, Incoming};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Accept,
    Refuse,
    /// Never completes; only the connect timeout ends the attempt.
    Hang,
}

enum ServerPush {
    Frame(Incoming),
    Fail(String),
}

/// Frame written by the client side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Text(String),
    Ping,
}

pub struct ScriptedConnector {
    script: Mutex<VecDeque<ConnectOutcome>>,
    fallback: ConnectOutcome,
    attempts: AtomicUsize,
    servers: mpsc::UnboundedSender<ServerEnd>,
}

impl ScriptedConnector {
    /// Connector that plays `script` in order, then `fallback` forever.
    pub fn new(
        script: impl IntoIterator<Item = ConnectOutcome>,
        fallback: ConnectOutcome,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (servers, servers_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            attempts: AtomicUsize::new(0),
            servers,
        });
        (connector, servers_rx)
    }

    pub fn always_accept() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        Self::new([], ConnectOutcome::Accept)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Channel>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);

        match outcome {
            ConnectOutcome::Accept => {
                let (channel, server) = memory_pair();
                let _ = self.servers.send(server);
                Ok(Box::new(channel))
            }
            ConnectOutcome::Refuse => Err(TransportError::Connect {
                endpoint: endpoint.to_string(),
                message: "connection refused".to_string(),
            }),
            ConnectOutcome::Hang => std::future::pending().await,
        }
    }
}

fn memory_pair() -> (MemoryChannel, ServerEnd) {
    let (to_client, from_server) = mpsc::unbounded_channel();
    let (to_server, from_client) = mpsc::unbounded_channel();
    let responsive = Arc::new(AtomicBool::new(true));

    let channel = MemoryChannel {
        inbound: from_server,
        loopback: to_client.downgrade(),
        outbound: to_server,
        responsive: Arc::clone(&responsive),
    };
    let server = ServerEnd {
        to_client,
        from_client,
        responsive,
    };
    (channel, server)
}

struct MemoryChannel {
    inbound: mpsc::UnboundedReceiver<ServerPush>,
    loopback: mpsc::WeakUnboundedSender<ServerPush>,
    outbound: mpsc::UnboundedSender<ClientFrame>,
    responsive: Arc<AtomicBool>,
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.outbound
            .send(ClientFrame::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.outbound
            .send(ClientFrame::Ping)
            .map_err(|_| TransportError::Closed)?;
        if self.responsive.load(Ordering::SeqCst) {
            if let Some(loopback) = self.loopback.upgrade() {
                let _ = loopback.send(ServerPush::Frame(Incoming::Heartbeat));
            }
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Incoming, TransportError>> {
        match self.inbound.recv().await? {
            ServerPush::Frame(incoming) => Some(Ok(incoming)),
            ServerPush::Fail(message) => Some(Err(TransportError::Io(message))),
        }
    }

    async fn close(&mut self) {
        self.inbound.close();
    }
}

/// The service side of one accepted in-memory connection.
///
/// Dropping it closes the channel from the server side.
pub struct ServerEnd {
    to_client: mpsc::UnboundedSender<ServerPush>,
    from_client: mpsc::UnboundedReceiver<ClientFrame>,
    responsive: Arc<AtomicBool>,
}

impl ServerEnd {
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self
            .to_client
            .send(ServerPush::Frame(Incoming::Text(text.into())));
    }

    pub fn push_binary(&self, bytes: Vec<u8>) {
        let _ = self
            .to_client
            .send(ServerPush::Frame(Incoming::Binary(bytes)));
    }

    /// Makes the next read on the client side fail with a transport error.
    pub fn fail(&self, message: impl Into<String>) {
        let _ = self.to_client.send(ServerPush::Fail(message.into()));
    }

    /// Stops answering heartbeats.
    pub fn go_silent(&self) {
        self.responsive.store(false, Ordering::SeqCst);
    }

    /// Next text frame written by the client, skipping heartbeats.
    pub async fn next_text(&mut self) -> Option<String> {
        loop {
            match self.from_client.recv().await? {
                ClientFrame::Text(text) => return Some(text),
                ClientFrame::Ping => continue,
            }
        }
    }

    /// Text frames written so far, without waiting.
    pub fn drain_texts(&mut self) -> Vec<String> {
        let mut texts = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            if let ClientFrame::Text(text) = frame {
                texts.push(text);
            }
        }
        texts
    }
}
