//! One physical connection to a task's live log stream.
//!
//! A session is a background task that feeds the response body through a
//! [`FrameDecoder`] and sends typed [`SessionEvent`]s over a channel. The
//! consumer holds a [`SessionHandle`] that cancels the session; once cancelled,
//! [`SessionEvents::recv`] returns `None` even if the producer already queued
//! more events.
//!
//! Sessions never retry. The first failure ends the session with exactly one
//! [`SessionEvent::Error`]; reconnecting is the supervisor's job.

use futures::StreamExt;
use log::{debug, warn};
use taskdeck_protocol::{LogStreamPayload, ReasoningLogEntry, StreamFrame};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::decoder::FrameDecoder;
use crate::api::TaskdeckClient;
use crate::error::{StreamError, StreamResult};

/// Lifecycle and data events from a stream session.
#[derive(Debug)]
pub enum SessionEvent {
    /// The endpoint accepted the connection. Sent before any log.
    Opened,
    /// A frame carrying a usable log entry.
    Log(ReasoningLogEntry),
    /// The session failed and is terminated.
    Error(StreamError),
}

/// Cancellation handle for a session. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    token: CancellationToken,
}

impl SessionHandle {
    /// Abort the connection. Idempotent, and harmless after the session ended.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Consumer side of a session.
#[derive(Debug)]
pub struct SessionEvents {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    token: CancellationToken,
}

impl SessionEvents {
    /// Next event, or `None` once the session is cancelled or gone.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        if self.token.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            event = self.rx.recv() => {
                // Cancellation can land while an event was already queued.
                if self.token.is_cancelled() { None } else { event }
            }
        }
    }
}

/// Producer side of a session.
///
/// Sends are dropped once the session is cancelled. [`SessionEmitter::fail`]
/// consumes the emitter, so a session reports at most one error.
#[derive(Debug)]
pub struct SessionEmitter {
    tx: mpsc::UnboundedSender<SessionEvent>,
    token: CancellationToken,
}

impl SessionEmitter {
    /// Report that the connection is open. Returns `false` if nobody listens.
    pub fn opened(&self) -> bool {
        self.send(SessionEvent::Opened)
    }

    /// Forward a log entry. Returns `false` if nobody listens.
    pub fn log(&self, entry: ReasoningLogEntry) -> bool {
        self.send(SessionEvent::Log(entry))
    }

    /// Terminate the session with an error.
    pub fn fail(self, error: StreamError) {
        self.send(SessionEvent::Error(error));
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when the consumer cancels the session.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    fn send(&self, event: SessionEvent) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        self.tx.send(event).is_ok()
    }
}

/// A running session: its cancellation handle and its event channel.
#[derive(Debug)]
pub struct StreamSession {
    pub handle: SessionHandle,
    pub events: SessionEvents,
}

impl StreamSession {
    /// Create a session without a transport, returning its producer side.
    pub fn channel() -> (SessionEmitter, StreamSession) {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let emitter = SessionEmitter {
            tx,
            token: token.clone(),
        };
        let session = StreamSession {
            handle: SessionHandle {
                token: token.clone(),
            },
            events: SessionEvents { rx, token },
        };
        (emitter, session)
    }

    /// Send `request` and stream its event-stream body on a background task.
    pub fn open(request: reqwest::RequestBuilder) -> StreamSession {
        let (emitter, session) = Self::channel();
        tokio::spawn(run_http_session(request, emitter));
        session
    }
}

/// Opens stream sessions for a task.
pub trait StreamConnector: Send + Sync {
    fn connect(&self, task_id: &str) -> StreamSession;
}

/// Connector for the orchestrator's HTTP stream endpoint.
#[derive(Debug, Clone)]
pub struct HttpStreamConnector {
    client: TaskdeckClient,
}

impl HttpStreamConnector {
    pub fn new(client: TaskdeckClient) -> Self {
        Self { client }
    }
}

impl StreamConnector for HttpStreamConnector {
    fn connect(&self, task_id: &str) -> StreamSession {
        debug!("Opening reasoning log stream for task {}", task_id);
        StreamSession::open(self.client.stream_request(task_id))
    }
}

async fn run_http_session(request: reqwest::RequestBuilder, emitter: SessionEmitter) {
    let outcome = tokio::select! {
        biased;
        _ = emitter.cancelled() => {
            debug!("Stream session cancelled");
            return;
        }
        outcome = pump(request, &emitter) => outcome,
    };

    if let Err(err) = outcome {
        if !emitter.is_cancelled() {
            warn!("Stream session failed: {}", err);
        }
        emitter.fail(err);
    }
}

/// Drive the connection until it fails. `Ok` means the consumer went away.
async fn pump(request: reqwest::RequestBuilder, emitter: &SessionEmitter) -> StreamResult<()> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(StreamError::Status(status));
    }

    if !emitter.opened() {
        return Ok(());
    }

    let mut decoder = FrameDecoder::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        for frame in decoder.feed(&chunk) {
            let Some(entry) = parse_log_frame(&frame)? else {
                continue;
            };
            if !emitter.log(entry) {
                return Ok(());
            }
        }
    }

    debug!(
        "Stream body ended with {} undecoded bytes",
        decoder.pending_len()
    );
    Err(StreamError::StreamEnded)
}

/// Extract the log entry from a frame. Frames without one are skipped.
fn parse_log_frame(frame: &StreamFrame) -> StreamResult<Option<ReasoningLogEntry>> {
    let entry = LogStreamPayload::extract(&frame.data)?;
    if entry.is_none() {
        debug!("Ignoring '{}' frame without a log entry", frame.event);
    }
    Ok(entry)
}
