//! Wire types for Taskdeck reasoning logs.
//!
//! These types are shared by everything that talks to the orchestrator's
//! reasoning-log endpoints:
//!
//! ```text
//! GET /api/tasks/{id}/reasoning-logs         -> [ReasoningLogEntry, ...]
//! GET /api/tasks/{id}/reasoning-logs/stream  -> text/event-stream of StreamFrame
//!                                               (data: {"log": ReasoningLogEntry})
//! ```
//!
//! The client never mutates an entry. It only re-derives its merged view from
//! the entries it has received, so every type here is plain data.

pub mod logs;
pub mod stream;

pub use logs::ReasoningLogEntry;
pub use stream::{ConnectionState, DEFAULT_EVENT_NAME, LogStreamPayload, StreamFrame};
