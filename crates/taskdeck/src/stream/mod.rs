//! Live reasoning-log stream.
//!
//! Layers, innermost first: the frame decoder turns bytes into frames, a
//! session turns one HTTP response into typed events, and the supervisor
//! reconnects sessions so callers see a single logical stream.

pub mod decoder;
pub mod session;
pub mod supervisor;

pub use decoder::FrameDecoder;
pub use session::{
    HttpStreamConnector, SessionEmitter, SessionEvent, SessionEvents, SessionHandle,
    StreamConnector, StreamSession,
};
pub use supervisor::{Backoff, Supervisor, SupervisorEvent, SupervisorEvents, SupervisorHandle};
