//! Live stream types.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::logs::ReasoningLogEntry;

/// Event name used when a frame carries no `event:` line.
pub const DEFAULT_EVENT_NAME: &str = "message";

/// Connection state of a live log stream as seen by the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded server-push message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    pub event: String,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

impl StreamFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }

    /// Frame with the default event name.
    pub fn message(data: impl Into<String>) -> Self {
        Self::new(DEFAULT_EVENT_NAME, data)
    }
}

/// Payload of a log frame: `{"log": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogStreamPayload {
    pub log: ReasoningLogEntry,
}

impl LogStreamPayload {
    /// Extract the log entry carried by frame data.
    ///
    /// Data that is not JSON at all is an error. JSON without a usable `log`
    /// object (missing, null, or the wrong shape) yields `Ok(None)`.
    pub fn extract(data: &str) -> serde_json::Result<Option<ReasoningLogEntry>> {
        let value: Value = serde_json::from_str(data)?;
        let entry = match value.get("log") {
            Some(log) if !log.is_null() => serde_json::from_value(log.clone()).ok(),
            _ => None,
        };
        Ok(entry)
    }

    /// Render as a complete event-stream frame, separator included.
    pub fn to_frame(&self) -> serde_json::Result<String> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}
