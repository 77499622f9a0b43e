//! Public entry point wiring transcript, dispatcher and connection together.
//!
//! All transcript mutation happens on one actor task. Outbound submissions
//! arrive as commands and inbound traffic as connection events; the actor
//! applies them one at a time and publishes a fresh snapshot after every
//! change. Callers only ever see snapshots.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionState};
use crate::core::bootstrap::BootstrapClient;
use crate::core::config::SessionConfig;
use crate::core::dispatcher::{InboundOutcome, OutboundDispatcher};
use crate::core::error::{DisconnectReason, SendError};
use crate::core::message::EntryId;
use crate::core::transcript::{TranscriptSnapshot, TranscriptStore};
use crate::transport::{Connector, WebSocketConnector};

/// Connection and bootstrap notifications for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Disconnected(DisconnectReason),
    /// The session cannot continue. Emitted at most once.
    Fatal(DisconnectReason),
    Bootstrapped { summary: Option<String> },
    BootstrapFailed(String),
    /// A non-fatal problem reported by the service or the channel.
    Error(String),
}

enum Command {
    Submit {
        text: String,
        reply: oneshot::Sender<Result<EntryId, SendError>>,
    },
    Shutdown,
}

/// Handle returned by [`Session::subscribe`].
#[derive(Debug, Clone)]
pub struct Subscription {
    token: CancellationToken,
}

impl Subscription {
    /// Stops further callbacks for this subscription.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }
}

pub struct Session {
    commands: mpsc::UnboundedSender<Command>,
    connection: Arc<ConnectionManager>,
    snapshots: watch::Receiver<TranscriptSnapshot>,
    subscriptions: CancellationToken,
    subscribers: Mutex<Vec<JoinHandle<()>>>,
    actor: Mutex<Option<JoinHandle<()>>>,
    bootstrap: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
    /// Held for the whole teardown; `true` once it has completed.
    teardown: AsyncMutex<bool>,
}

impl Session {
    /// Starts a session over WebSocket.
    ///
    /// When `context` is given the bootstrap request runs concurrently with
    /// connection establishment; its outcome arrives as an event. Must be
    /// called within a tokio runtime.
    pub fn start(
        config: SessionConfig,
        context: Option<Value>,
    ) -> (Session, mpsc::UnboundedReceiver<SessionEvent>) {
        Self::start_with_connector(config, context, Arc::new(WebSocketConnector))
    }

    pub fn start_with_connector(
        config: SessionConfig,
        context: Option<Value>,
        connector: Arc<dyn Connector>,
    ) -> (Session, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (snapshots_tx, snapshots_rx) = watch::channel(TranscriptSnapshot::default());

        let connection = Arc::new(ConnectionManager::new(connector));
        let bootstrap = context.map(|context| {
            tokio::spawn(run_bootstrap(
                config.bootstrap_url.clone(),
                config.bootstrap_timeout,
                context,
                events_tx.clone(),
            ))
        });

        info!(endpoint = %config.endpoint, "Starting session");
        let connection_events = match connection.open(config.endpoint, config.connection) {
            Ok(events) => events,
            Err(err) => {
                // Unreachable for a fresh manager; the actor then sees a
                // closed event stream and every send fails.
                error!(error = %err, "Failed to open connection");
                mpsc::unbounded_channel().1
            }
        };

        let actor = SessionActor {
            transcript: TranscriptStore::new(),
            dispatcher: OutboundDispatcher::new(),
            connection: Arc::clone(&connection),
            snapshots: snapshots_tx,
            events: events_tx,
            fatal_reported: false,
        };
        let actor = tokio::spawn(actor.run(commands_rx, connection_events));

        let session = Session {
            commands: commands_tx,
            connection,
            snapshots: snapshots_rx,
            subscriptions: CancellationToken::new(),
            subscribers: Mutex::new(Vec::new()),
            actor: Mutex::new(Some(actor)),
            bootstrap: Mutex::new(bootstrap),
            stopped: AtomicBool::new(false),
            teardown: AsyncMutex::new(false),
        };
        (session, events_rx)
    }

    /// Submits `text` to the conversation.
    ///
    /// The entry is in the transcript (as `Pending`, or `Failed` if the
    /// channel refused it) by the time this returns, unless the text was
    /// blank or the session has stopped.
    pub async fn send(&self, text: impl Into<String>) -> Result<EntryId, SendError> {
        if self.is_stopped() {
            return Err(SendError::NotConnected { id: None });
        }
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Submit {
                text: text.into(),
                reply,
            })
            .map_err(|_| SendError::NotConnected { id: None })?;
        response
            .await
            .unwrap_or(Err(SendError::NotConnected { id: None }))
    }

    /// Calls `callback` with the current snapshot and then after every
    /// transcript change. Rapid bursts may be coalesced into one call with
    /// the latest snapshot.
    pub fn subscribe<F>(&self, mut callback: F) -> Subscription
    where
        F: FnMut(TranscriptSnapshot) + Send + 'static,
    {
        let token = self.subscriptions.child_token();
        let mut snapshots = self.snapshots.clone();
        let cancelled = token.clone();

        let handle = tokio::spawn(async move {
            let initial = snapshots.borrow_and_update().clone();
            callback(initial);
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    changed = snapshots.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = snapshots.borrow_and_update().clone();
                        callback(snapshot);
                    }
                }
            }
        });

        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|handle| !handle.is_finished());
        subscribers.push(handle);
        Subscription { token }
    }

    pub fn snapshot(&self) -> TranscriptSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Tears the session down: cancels the bootstrap request, closes the
    /// connection, fails outstanding sends and detaches every subscriber.
    /// No events are emitted after this returns. Safe to call repeatedly and
    /// concurrently; later callers wait for the teardown in progress.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let mut torn_down = self.teardown.lock().await;
        if *torn_down {
            return;
        }
        debug!("Stopping session");

        let bootstrap = self
            .bootstrap
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = bootstrap {
            handle.abort();
            let _ = handle.await;
        }

        self.connection.close().await;

        let _ = self.commands.send(Command::Shutdown);
        let actor = self
            .actor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = actor {
            if let Err(err) = handle.await {
                warn!(error = %err, "Session actor ended abnormally");
            }
        }

        // The snapshot sender is gone, so subscribers finish after the final
        // snapshot.
        let subscribers = std::mem::take(
            &mut *self
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for handle in subscribers {
            let _ = handle.await;
        }
        self.subscriptions.cancel();
        *torn_down = true;
        info!("Session stopped");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.subscriptions.cancel();
        if let Some(handle) = self
            .bootstrap
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

async fn run_bootstrap(
    url: String,
    timeout: std::time::Duration,
    context: Value,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    let result = match BootstrapClient::new(url, timeout) {
        Ok(client) => client.prime(&context).await,
        Err(err) => Err(err),
    };
    let event = match result {
        Ok(ack) => SessionEvent::Bootstrapped {
            summary: ack.summary_text().map(str::to_owned),
        },
        Err(err) => {
            warn!(error = %err, "Bootstrap request failed; continuing without it");
            SessionEvent::BootstrapFailed(err.to_string())
        }
    };
    let _ = events.send(event);
}

struct SessionActor {
    transcript: TranscriptStore,
    dispatcher: OutboundDispatcher,
    connection: Arc<ConnectionManager>,
    snapshots: watch::Sender<TranscriptSnapshot>,
    events: mpsc::UnboundedSender<SessionEvent>,
    fatal_reported: bool,
}

impl SessionActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut connection_events: mpsc::UnboundedReceiver<ConnectionEvent>,
    ) {
        loop {
            tokio::select! {
                biased;
                Some(event) = connection_events.recv() => self.handle_connection_event(event),
                command = commands.recv() => match command {
                    Some(Command::Submit { text, reply }) => {
                        let result = self.submit(&text);
                        let _ = reply.send(result);
                    }
                    Some(Command::Shutdown) => {
                        // The driver has finished; apply what it reported last.
                        while let Ok(event) = connection_events.try_recv() {
                            self.handle_connection_event(event);
                        }
                        self.fail_outstanding();
                        break;
                    }
                    None => break,
                },
            }
        }
        debug!(entries = self.transcript.len(), "Session actor finished");
    }

    fn submit(&mut self, text: &str) -> Result<EntryId, SendError> {
        let result = self
            .dispatcher
            .submit(&mut self.transcript, self.connection.as_ref(), text);
        if matches!(
            result,
            Ok(_) | Err(SendError::NotConnected { id: Some(_) })
        ) {
            self.publish();
        }
        result
    }

    fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => self.emit(SessionEvent::Connected),
            ConnectionEvent::Disconnected(reason) => {
                self.fail_outstanding();
                self.emit(SessionEvent::Disconnected(reason));
                if reason.is_fatal() && !self.fatal_reported {
                    self.fatal_reported = true;
                    error!(reason = %reason, "Session cannot continue");
                    self.emit(SessionEvent::Fatal(reason));
                }
            }
            ConnectionEvent::Message(frame) => {
                match self.dispatcher.handle_inbound(&mut self.transcript, frame) {
                    InboundOutcome::ServiceError(message) => {
                        warn!(message = %message, "Service reported an error");
                        self.emit(SessionEvent::Error(message));
                    }
                    outcome if outcome.changed_transcript() => self.publish(),
                    _ => {}
                }
            }
            ConnectionEvent::Error(message) => self.emit(SessionEvent::Error(message)),
        }
    }

    fn fail_outstanding(&mut self) {
        if !self.dispatcher.fail_outstanding(&mut self.transcript).is_empty() {
            self.publish();
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.transcript.snapshot());
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}
