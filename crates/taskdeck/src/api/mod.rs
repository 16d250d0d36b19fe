//! REST access to the orchestrator.

pub mod client;

pub use client::{DEV_USER_HEADER, HistorySource, TaskdeckClient};
