//! Append-only transcript of a single session.
//!
//! The store is owned by the session actor, so every append and status change
//! is applied by one writer. Sequence numbers are issued here and nowhere else.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use chrono::Utc;

use crate::core::message::{EntryId, MessageEntry, MessageStatus};

/// Immutable point-in-time view of the transcript, ordered by sequence.
///
/// Cloning is cheap; subscribers can hold on to a snapshot while the session
/// keeps appending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptSnapshot {
    entries: Arc<[MessageEntry]>,
}

impl TranscriptSnapshot {
    pub fn entries(&self) -> &[MessageEntry] {
        &self.entries
    }

    pub fn get(&self, id: &EntryId) -> Option<&MessageEntry> {
        self.entries.iter().find(|entry| &entry.id == id)
    }
}

impl Deref for TranscriptSnapshot {
    type Target = [MessageEntry];

    fn deref(&self) -> &Self::Target {
        &self.entries
    }
}

#[derive(Debug)]
pub struct TranscriptStore {
    entries: Vec<MessageEntry>,
    index: HashMap<EntryId, usize>,
    next_sequence: u64,
}

impl Default for TranscriptStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            next_sequence: 1,
        }
    }

    /// Appends `entry` and returns the sequence number assigned to it.
    ///
    /// Whatever `sequence` the entry carried is overwritten. Callers must not
    /// reuse an id already present; [`TranscriptStore::contains`] lets them
    /// check first.
    pub fn append(&mut self, mut entry: MessageEntry) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        entry.sequence = sequence;
        entry.created_at = Utc::now();
        self.index.insert(entry.id.clone(), self.entries.len());
        self.entries.push(entry);
        sequence
    }

    /// Moves a `Pending` entry to `new_status`.
    ///
    /// Unknown ids and entries already in a terminal state are left alone.
    /// Returns whether the entry changed.
    pub fn update_status(&mut self, id: &EntryId, new_status: MessageStatus) -> bool {
        let Some(&position) = self.index.get(id) else {
            return false;
        };
        let entry = &mut self.entries[position];
        if entry.status.is_terminal() || entry.status == new_status {
            return false;
        }
        entry.status = new_status;
        true
    }

    pub fn get(&self, id: &EntryId) -> Option<&MessageEntry> {
        self.index.get(id).map(|&position| &self.entries[position])
    }

    pub fn contains(&self, id: &EntryId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> TranscriptSnapshot {
        TranscriptSnapshot {
            entries: Arc::from(self.entries.as_slice()),
        }
    }
}
