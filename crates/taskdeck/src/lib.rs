//! Taskdeck reasoning-log client library.
//!
//! Keeps a task's reasoning log in sync with the orchestrator: a one-shot
//! history fetch is merged with a live event stream that reconnects on its
//! own, and the result is exposed as a single ordered, deduplicated view.

pub mod api;
pub mod config;
pub mod error;
pub mod logs;
pub mod stream;
pub mod view;

pub use error::{ApiError, ApiResult, StreamError, StreamResult};
pub use view::{LogView, ReasoningLogBinding};
