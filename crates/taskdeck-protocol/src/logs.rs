//! Reasoning log entries.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One recorded step of orchestrator reasoning or activity for a task.
///
/// `id` identifies the logical event across retransmissions. `sequence` is the
/// server-assigned ordering key. Everything else is payload that the client
/// passes through to the view untouched, including fields it does not know
/// about (kept in `extra`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningLogEntry {
    pub id: String,

    pub sequence: i64,

    /// ISO-8601 timestamp as sent by the server.
    #[serde(default)]
    pub created_at: String,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub event_type: String,

    #[serde(default)]
    pub message: String,

    /// Unknown fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ReasoningLogEntry {
    /// Build an entry with an empty payload.
    pub fn new(id: impl Into<String>, sequence: i64, created_at: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sequence,
            created_at: created_at.into(),
            status: String::new(),
            event_type: String::new(),
            message: String::new(),
            extra: Map::new(),
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}
