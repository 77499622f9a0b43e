//! Optimistic outbound messages and their reconciliation.
//!
//! Submitted text is appended as `Local`/`Pending` before it is handed to the
//! connection. The entry becomes `Confirmed` when the service acknowledges or
//! echoes it, and `Failed` when it could not be sent or the connection dropped
//! first. Failed entries are never resent automatically.

use std::collections::HashMap;

use tokio::time::Instant;
use tracing::debug;

use crate::api::{InboundFrame, OutboundFrame};
use crate::connection::FrameSink;
use crate::core::error::SendError;
use crate::core::message::{EntryId, MessageEntry, MessageStatus};
use crate::core::transcript::TranscriptStore;

/// A local entry still waiting for the service to acknowledge it.
#[derive(Debug, Clone)]
pub struct PendingSend {
    pub id: EntryId,
    pub submitted_at: Instant,
}

/// What an inbound frame did to the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// A pending local entry was confirmed.
    Confirmed(EntryId),
    /// A new remote entry was appended at this sequence.
    Appended(u64),
    /// The service reported an error; nothing was appended.
    ServiceError(String),
    /// Nothing changed (late or unknown acknowledgement).
    Ignored,
}

impl InboundOutcome {
    pub fn changed_transcript(&self) -> bool {
        matches!(
            self,
            InboundOutcome::Confirmed(_) | InboundOutcome::Appended(_)
        )
    }
}

#[derive(Debug, Default)]
pub struct OutboundDispatcher {
    pending: HashMap<EntryId, PendingSend>,
}

impl OutboundDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `text` optimistically and hands it to `sink`.
    ///
    /// Blank input is rejected before anything is appended. When the sink
    /// refuses the frame the new entry is marked `Failed` right away and the
    /// error names it.
    pub fn submit(
        &mut self,
        transcript: &mut TranscriptStore,
        sink: &dyn FrameSink,
        text: &str,
    ) -> Result<EntryId, SendError> {
        if text.trim().is_empty() {
            return Err(SendError::EmptyMessage);
        }

        let id = EntryId::generate_local();
        let sequence = transcript.append(MessageEntry::local_pending(id.clone(), text));
        self.pending.insert(
            id.clone(),
            PendingSend {
                id: id.clone(),
                submitted_at: Instant::now(),
            },
        );

        let payload = OutboundFrame::message(id.as_str(), text).encode();
        match sink.try_send(payload) {
            Ok(()) => {
                debug!(id = %id, sequence, "Message queued for sending");
                Ok(id)
            }
            Err(_) => {
                self.pending.remove(&id);
                transcript.update_status(&id, MessageStatus::Failed);
                debug!(id = %id, sequence, "Message failed: not connected");
                Err(SendError::NotConnected { id: Some(id) })
            }
        }
    }

    /// Applies one decoded frame from the service.
    pub fn handle_inbound(
        &mut self,
        transcript: &mut TranscriptStore,
        frame: InboundFrame,
    ) -> InboundOutcome {
        match frame {
            InboundFrame::Ack { client_id } => self.confirm(transcript, EntryId::new(client_id)),
            InboundFrame::Reply {
                client_id: Some(client_id),
                ..
            } if is_local_entry(transcript, &client_id) => {
                self.confirm(transcript, EntryId::new(client_id))
            }
            InboundFrame::Reply { id, text, .. } => {
                let id = id
                    .filter(|id| !id.trim().is_empty())
                    .map(EntryId::new)
                    .filter(|id| !transcript.contains(id))
                    .unwrap_or_else(EntryId::generate_remote);
                InboundOutcome::Appended(transcript.append(MessageEntry::remote(id, text)))
            }
            InboundFrame::Error { message } => InboundOutcome::ServiceError(message),
        }
    }

    /// Marks every outstanding entry `Failed`; called when the connection
    /// leaves `Connected` or the session ends.
    pub fn fail_outstanding(&mut self, transcript: &mut TranscriptStore) -> Vec<EntryId> {
        let mut failed: Vec<PendingSend> = self.pending.drain().map(|(_, send)| send).collect();
        failed.sort_by_key(|send| transcript.get(&send.id).map(|entry| entry.sequence));

        failed
            .into_iter()
            .filter_map(|send| {
                debug!(
                    id = %send.id,
                    waited_ms = send.submitted_at.elapsed().as_millis() as u64,
                    "Message failed: connection lost before acknowledgement"
                );
                transcript
                    .update_status(&send.id, MessageStatus::Failed)
                    .then_some(send.id)
            })
            .collect()
    }

    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    pub fn is_outstanding(&self, id: &EntryId) -> bool {
        self.pending.contains_key(id)
    }

    fn confirm(&mut self, transcript: &mut TranscriptStore, id: EntryId) -> InboundOutcome {
        if self.pending.remove(&id).is_none() {
            debug!(id = %id, "Ignoring acknowledgement for an entry that is not pending");
            return InboundOutcome::Ignored;
        }
        if transcript.update_status(&id, MessageStatus::Confirmed) {
            InboundOutcome::Confirmed(id)
        } else {
            InboundOutcome::Ignored
        }
    }
}

fn is_local_entry(transcript: &TranscriptStore, client_id: &str) -> bool {
    transcript
        .get(&EntryId::new(client_id))
        .is_some_and(MessageEntry::is_local)
}
