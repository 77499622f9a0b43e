use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    Backoff, ConnectionEvent, ConnectionOptions, ConnectionState, LinkState, QueuedFrame,
};
use crate::api::decode_inbound;
use crate::core::error::{DecodeError, DisconnectReason};
use crate::transport::{Channel, Connector, Incoming};

const CHANNEL_CLOSE_GRACE: Duration = Duration::from_secs(1);
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

enum LinkOutcome {
    Cancelled,
    Lost(DisconnectReason),
}

/// Background task that owns the state machine of one connection.
pub(super) struct Driver {
    endpoint: String,
    options: ConnectionOptions,
    connector: Arc<dyn Connector>,
    link: Arc<watch::Sender<LinkState>>,
    outbound: mpsc::Receiver<QueuedFrame>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    cancel: CancellationToken,
    backoff: Backoff,
}

impl Driver {
    pub(super) fn new(
        endpoint: String,
        options: ConnectionOptions,
        connector: Arc<dyn Connector>,
        link: Arc<watch::Sender<LinkState>>,
        outbound: mpsc::Receiver<QueuedFrame>,
        events: mpsc::UnboundedSender<ConnectionEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let backoff = Backoff::new(options.backoff_base, options.backoff_ceiling);
        Self {
            endpoint,
            options,
            connector,
            link,
            outbound,
            events,
            cancel,
            backoff,
        }
    }

    pub(super) async fn run(mut self) {
        let mut failures: u32 = 0;

        loop {
            self.transition(ConnectionState::Connecting);

            let attempt = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = tokio::time::timeout(
                    self.options.connect_timeout,
                    self.connector.connect(&self.endpoint),
                ) => result,
            };

            let reason = match attempt {
                Ok(Ok(channel)) => {
                    failures = 0;
                    self.backoff.reset();
                    self.transition(ConnectionState::Connected);
                    info!(endpoint = %self.endpoint, "Connected");
                    self.emit(ConnectionEvent::Connected);

                    match self.run_connected(channel).await {
                        LinkOutcome::Cancelled => break,
                        LinkOutcome::Lost(reason) => reason,
                    }
                }
                Ok(Err(err)) => {
                    failures += 1;
                    warn!(error = %err, failures, "Connect attempt failed");
                    DisconnectReason::TransportError
                }
                Err(_) => {
                    failures += 1;
                    warn!(
                        timeout_ms = self.options.connect_timeout.as_millis() as u64,
                        failures,
                        "Connect attempt timed out"
                    );
                    DisconnectReason::Timeout
                }
            };

            self.transition(ConnectionState::Reconnecting);
            self.discard_queued();
            self.emit(ConnectionEvent::Disconnected(reason));

            if failures >= self.options.max_reconnect_attempts {
                warn!(failures, "Giving up on reconnecting");
                self.transition(ConnectionState::Closed);
                self.emit(ConnectionEvent::Disconnected(
                    DisconnectReason::RetriesExhausted,
                ));
                return;
            }

            let delay = self.backoff.next_delay();
            debug!(
                delay_ms = delay.as_millis() as u64,
                attempt = self.backoff.attempt(),
                "Scheduling reconnect"
            );
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.transition(ConnectionState::Closed);
        self.discard_queued();
        self.emit(ConnectionEvent::Disconnected(DisconnectReason::ExplicitClose));
    }

    async fn run_connected(&mut self, mut channel: Box<dyn Channel>) -> LinkOutcome {
        let epoch = self.link.borrow().epoch;
        let period = self.options.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL);
        let liveness_window = period + self.options.heartbeat_timeout;
        let mut last_seen = Instant::now();
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break LinkOutcome::Cancelled,
                incoming = channel.recv() => match incoming {
                    Some(Ok(incoming)) => {
                        last_seen = Instant::now();
                        self.handle_incoming(incoming);
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "Channel failed");
                        break LinkOutcome::Lost(DisconnectReason::TransportError);
                    }
                    None => {
                        info!("Peer closed the channel");
                        break LinkOutcome::Lost(DisconnectReason::TransportError);
                    }
                },
                Some(frame) = self.outbound.recv() => {
                    if frame.epoch != epoch {
                        debug!(epoch = frame.epoch, "Dropping frame queued for an earlier connection");
                        continue;
                    }
                    if let Err(err) = channel.send_text(frame.payload).await {
                        warn!(error = %err, "Failed to write frame");
                        break LinkOutcome::Lost(DisconnectReason::TransportError);
                    }
                }
                _ = heartbeat.tick() => {
                    if last_seen.elapsed() >= liveness_window {
                        warn!(
                            silent_ms = last_seen.elapsed().as_millis() as u64,
                            "Heartbeat timed out"
                        );
                        break LinkOutcome::Lost(DisconnectReason::Timeout);
                    }
                    if let Err(err) = channel.ping().await {
                        warn!(error = %err, "Failed to send heartbeat");
                        break LinkOutcome::Lost(DisconnectReason::TransportError);
                    }
                }
            }
        };

        // Leave `Connected` before the close handshake so `send` fails fast.
        let next = match outcome {
            LinkOutcome::Cancelled => ConnectionState::Closed,
            LinkOutcome::Lost(_) => ConnectionState::Reconnecting,
        };
        self.transition(next);
        if tokio::time::timeout(CHANNEL_CLOSE_GRACE, channel.close())
            .await
            .is_err()
        {
            debug!("Channel close handshake timed out");
        }
        outcome
    }

    fn handle_incoming(&self, incoming: Incoming) {
        let decoded = match incoming {
            Incoming::Heartbeat => return,
            Incoming::Text(text) => decode_inbound(&text),
            Incoming::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => decode_inbound(&text),
                Err(_) => Err(DecodeError::NotUtf8),
            },
        };

        match decoded {
            Ok(frame) => self.emit(ConnectionEvent::Message(frame)),
            Err(err) => {
                warn!(error = %err, "Discarding undecodable frame");
                self.emit(ConnectionEvent::Error(err.to_string()));
            }
        }
    }

    fn transition(&self, next: ConnectionState) {
        self.link.send_if_modified(|link| {
            if link.state == next {
                return false;
            }
            debug!(from = link.state.as_str(), to = next.as_str(), "Connection state change");
            if next == ConnectionState::Connecting {
                link.epoch += 1;
            }
            link.state = next;
            true
        });
    }

    fn discard_queued(&mut self) {
        let mut dropped = 0usize;
        while self.outbound.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "Discarded frames queued for a lost connection");
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        // The owner may already have stopped listening; nothing to do then.
        let _ = self.events.send(event);
    }
}
