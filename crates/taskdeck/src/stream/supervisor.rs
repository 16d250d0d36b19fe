//! Reconnection supervisor for live log streams.
//!
//! Wraps short-lived [`StreamSession`]s in a retry loop with capped exponential
//! backoff so the consumer sees one logical stream per task:
//!
//! ```text
//! connecting --opened--> connected --error--> disconnected --retry--> connecting
//!      \___________________ cancel (any state) ___________________> stopped
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use taskdeck_protocol::{ConnectionState, ReasoningLogEntry};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::session::{SessionEvent, SessionHandle, StreamConnector, StreamSession};
use crate::config::StreamConfig;
use crate::error::StreamError;

/// Capped exponential backoff between reconnect attempts.
///
/// The delay for `attempts` prior failures is
/// `min(initial * 2^min(attempts, max_exponent), max_delay)`: the exponent is
/// capped first and the resulting value second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max_exponent: u32,
    pub max_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(1_000),
            max_exponent: 4,
            max_delay: Duration::from_millis(15_000),
        }
    }
}

impl Backoff {
    pub fn delay(&self, attempts: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempts.min(self.max_exponent));
        self.initial.saturating_mul(factor).min(self.max_delay)
    }
}

impl From<&StreamConfig> for Backoff {
    fn from(config: &StreamConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.initial_delay_ms),
            max_exponent: config.max_exponent,
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

/// What the supervisor reports to its consumer.
#[derive(Debug)]
pub enum SupervisorEvent {
    State(ConnectionState),
    /// User-facing warning; `None` clears it.
    Warning(Option<String>),
    Log(ReasoningLogEntry),
    /// A reconnect was scheduled after `delay`. `attempt` counts failures
    /// since the last successful open, starting at 1.
    RetryScheduled { attempt: u32, delay: Duration },
}

/// Shared between the handle and the retry loop.
#[derive(Debug, Default)]
struct Shared {
    disposed: AtomicBool,
    token: CancellationToken,
    active: Mutex<Option<SessionHandle>>,
}

impl Shared {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn set_active(&self, handle: Option<SessionHandle>) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        *active = handle;
    }
}

/// Stops a running supervisor. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    shared: Arc<Shared>,
}

impl SupervisorHandle {
    /// Stop the supervisor: cancel the pending retry and the active session.
    ///
    /// Idempotent. No events are observed after this returns.
    pub fn cancel(&self) {
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.token.cancel();
        let active = self
            .shared
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(session) = active {
            session.cancel();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_disposed()
    }
}

/// Consumer side of a supervisor.
#[derive(Debug)]
pub struct SupervisorEvents {
    rx: mpsc::UnboundedReceiver<SupervisorEvent>,
    shared: Arc<Shared>,
}

impl SupervisorEvents {
    /// Next event, or `None` once the supervisor is stopped.
    pub async fn recv(&mut self) -> Option<SupervisorEvent> {
        if self.shared.is_disposed() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.shared.token.cancelled() => None,
            event = self.rx.recv() => {
                if self.shared.is_disposed() { None } else { event }
            }
        }
    }
}

/// Keeps a task's live stream connected.
pub struct Supervisor {
    task_id: String,
    connector: Arc<dyn StreamConnector>,
    backoff: Backoff,
    shared: Arc<Shared>,
    tx: mpsc::UnboundedSender<SupervisorEvent>,
}

impl Supervisor {
    /// Start supervising `task_id` on the current tokio runtime.
    pub fn spawn(
        task_id: impl Into<String>,
        connector: Arc<dyn StreamConnector>,
        backoff: Backoff,
    ) -> (SupervisorHandle, SupervisorEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());
        let supervisor = Supervisor {
            task_id: task_id.into(),
            connector,
            backoff,
            shared: shared.clone(),
            tx,
        };
        tokio::spawn(supervisor.run());

        (
            SupervisorHandle {
                shared: shared.clone(),
            },
            SupervisorEvents { rx, shared },
        )
    }

    async fn run(self) {
        let mut attempts: u32 = 0;

        while !self.is_abandoned() {
            let StreamSession {
                handle,
                mut events,
            } = self.connector.connect(&self.task_id);
            self.shared.set_active(Some(handle.clone()));
            // cancel() may have run between the loop check and set_active.
            if self.shared.is_disposed()
                || !self.emit(SupervisorEvent::State(ConnectionState::Connecting))
            {
                handle.cancel();
                break;
            }

            let reason = loop {
                let event = tokio::select! {
                    biased;
                    _ = self.shared.token.cancelled() => None,
                    _ = self.tx.closed() => None,
                    event = events.recv() => Some(event),
                };
                let Some(event) = event else {
                    handle.cancel();
                    return;
                };

                let delivered = match event {
                    Some(SessionEvent::Opened) => {
                        info!("Live log stream connected for task {}", self.task_id);
                        attempts = 0;
                        self.emit(SupervisorEvent::State(ConnectionState::Connected))
                            && self.emit(SupervisorEvent::Warning(None))
                    }
                    Some(SessionEvent::Log(entry)) => self.emit(SupervisorEvent::Log(entry)),
                    Some(SessionEvent::Error(err)) => break err.to_string(),
                    None => break StreamError::SessionClosed.to_string(),
                };
                if !delivered {
                    handle.cancel();
                    return;
                }
            };

            handle.cancel();
            self.shared.set_active(None);
            if self.is_abandoned() {
                break;
            }

            let delay = self.backoff.delay(attempts);
            attempts = attempts.saturating_add(1);
            warn!(
                "Live log stream for task {} disconnected (attempt {}): {}; retrying in {:?}",
                self.task_id, attempts, reason, delay
            );
            let delivered = self.emit(SupervisorEvent::State(ConnectionState::Disconnected))
                && self.emit(SupervisorEvent::Warning(Some(format!(
                    "Live updates interrupted ({reason}). Reconnecting in {}s...",
                    delay.as_secs_f64()
                ))))
                && self.emit(SupervisorEvent::RetryScheduled {
                    attempt: attempts,
                    delay,
                });
            if !delivered {
                break;
            }

            tokio::select! {
                biased;
                _ = self.shared.token.cancelled() => break,
                _ = self.tx.closed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!("Supervisor for task {} stopped", self.task_id);
    }

    /// Stopped explicitly, or nobody holds the event receiver any more.
    fn is_abandoned(&self) -> bool {
        self.shared.is_disposed() || self.tx.is_closed()
    }

    /// Returns `false` once the consumer is gone.
    fn emit(&self, event: SupervisorEvent) -> bool {
        if self.shared.is_disposed() {
            return false;
        }
        self.tx.send(event).is_ok()
    }
}
