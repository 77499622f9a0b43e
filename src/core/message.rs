use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a transcript entry.
///
/// Locally originated entries receive a generated identifier; remote entries
/// keep the server-assigned one when the frame carries it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn generate_local() -> Self {
        Self(format!("local-{}", uuid::Uuid::new_v4()))
    }

    pub fn generate_remote() -> Self {
        Self(format!("remote-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntryId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for EntryId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Confirmed,
    Failed,
}

impl MessageStatus {
    /// `Confirmed` and `Failed` never change once reached.
    pub fn is_terminal(self) -> bool {
        matches!(self, MessageStatus::Confirmed | MessageStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Confirmed => "confirmed",
            MessageStatus::Failed => "failed",
        }
    }
}

/// A single line of the conversation as the caller sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub id: EntryId,
    pub origin: Origin,
    pub text: String,
    pub status: MessageStatus,
    /// Display position. Zero until the transcript assigns one on append.
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

impl MessageEntry {
    /// An optimistic entry for text the user just submitted.
    pub fn local_pending(id: EntryId, text: impl Into<String>) -> Self {
        Self {
            id,
            origin: Origin::Local,
            text: text.into(),
            status: MessageStatus::Pending,
            sequence: 0,
            created_at: Utc::now(),
        }
    }

    /// Remote entries are confirmed by construction.
    pub fn remote(id: EntryId, text: impl Into<String>) -> Self {
        Self {
            id,
            origin: Origin::Remote,
            text: text.into(),
            status: MessageStatus::Confirmed,
            sequence: 0,
            created_at: Utc::now(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.origin == Origin::Local
    }

    pub fn is_remote(&self) -> bool {
        self.origin == Origin::Remote
    }
}
