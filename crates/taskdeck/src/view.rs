//! Presentation-facing binding for a task's reasoning log.
//!
//! [`ReasoningLogBinding`] owns everything needed to show one task's log: the
//! historical set, the live set fed by a [`Supervisor`], and the connection
//! metadata. Every change recomputes the merged sequence under one lock and
//! publishes a complete [`LogView`], so readers never see a partial update.
//!
//! Switching tasks disposes the previous supervisor first. Work that was
//! already in flight for the old task is tagged with its generation and is
//! dropped when it completes.

use std::sync::{Arc, Mutex};

use log::{debug, warn};
use serde::Serialize;
use taskdeck_protocol::{ConnectionState, ReasoningLogEntry};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::api::{HistorySource, TaskdeckClient};
use crate::logs::{LiveLogSet, combine};
use crate::stream::{
    Backoff, HttpStreamConnector, StreamConnector, Supervisor, SupervisorEvent, SupervisorEvents,
    SupervisorHandle,
};

/// What the rendering layer consumes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogView {
    /// Merged entries in canonical order.
    pub logs: Vec<ReasoningLogEntry>,
    pub is_loading: bool,
    pub is_error: bool,
    /// History fetch error, if any.
    pub error: Option<String>,
    pub stream_state: ConnectionState,
    pub stream_warning: Option<String>,
}

impl LogView {
    /// View of a binding with no task.
    pub fn idle() -> Self {
        Self {
            logs: Vec::new(),
            is_loading: false,
            is_error: false,
            error: None,
            stream_state: ConnectionState::Disconnected,
            stream_warning: None,
        }
    }

    fn loading() -> Self {
        Self {
            is_loading: true,
            stream_state: ConnectionState::Connecting,
            ..Self::idle()
        }
    }
}

impl Default for LogView {
    fn default() -> Self {
        Self::idle()
    }
}

#[derive(Debug)]
struct Inner {
    generation: u64,
    /// Bumped per history request; only the latest request may land.
    history_fetch: u64,
    historical: Vec<ReasoningLogEntry>,
    live: LiveLogSet,
    view: LogView,
}

impl Inner {
    fn reset(&mut self, view: LogView) {
        self.historical.clear();
        self.live.clear();
        self.view = view;
    }
}

#[derive(Debug)]
struct Shared {
    inner: Mutex<Inner>,
    view_tx: watch::Sender<LogView>,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `f` if `generation` is still current, then publish.
    ///
    /// Returns `false` when the generation is stale and nothing was applied.
    fn update(&self, generation: u64, f: impl FnOnce(&mut Inner)) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        f(&mut inner);
        Self::publish(&mut inner, &self.view_tx);
        true
    }

    /// Recompute the merged logs and publish the whole view.
    fn publish(inner: &mut Inner, view_tx: &watch::Sender<LogView>) {
        inner.view.logs = combine(&inner.historical, inner.live.entries());
        view_tx.send_replace(inner.view.clone());
    }
}

struct ActiveTask {
    task_id: String,
    generation: u64,
    supervisor: SupervisorHandle,
    token: CancellationToken,
}

/// Keeps one task's merged reasoning log up to date.
///
/// Must be used from within a tokio runtime. Dropping the binding stops its
/// stream.
pub struct ReasoningLogBinding {
    history: Arc<dyn HistorySource>,
    connector: Arc<dyn StreamConnector>,
    backoff: Backoff,
    shared: Arc<Shared>,
    active: Option<ActiveTask>,
}

impl ReasoningLogBinding {
    pub fn new(
        history: Arc<dyn HistorySource>,
        connector: Arc<dyn StreamConnector>,
        backoff: Backoff,
    ) -> Self {
        let (view_tx, _) = watch::channel(LogView::idle());
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                generation: 0,
                history_fetch: 0,
                historical: Vec::new(),
                live: LiveLogSet::new(),
                view: LogView::idle(),
            }),
            view_tx,
        });
        Self {
            history,
            connector,
            backoff,
            shared,
            active: None,
        }
    }

    /// Binding backed by the orchestrator's HTTP API.
    pub fn from_client(client: TaskdeckClient, backoff: Backoff) -> Self {
        let connector = HttpStreamConnector::new(client.clone());
        Self::new(Arc::new(client), Arc::new(connector), backoff)
    }

    /// Show `task_id`, replacing any task currently bound.
    pub fn bind(&mut self, task_id: impl Into<String>) {
        self.unbind();
        let task_id = task_id.into();

        let generation = {
            let mut inner = self.shared.lock();
            inner.generation += 1;
            inner.reset(LogView::loading());
            Shared::publish(&mut inner, &self.shared.view_tx);
            inner.generation
        };

        let token = CancellationToken::new();
        self.spawn_history_fetch(&task_id, generation, token.clone());

        let (supervisor, events) =
            Supervisor::spawn(task_id.clone(), self.connector.clone(), self.backoff);
        tokio::spawn(forward_supervisor_events(
            self.shared.clone(),
            generation,
            events,
            token.clone(),
        ));

        debug!("Bound reasoning log view to task {}", task_id);
        self.active = Some(ActiveTask {
            task_id,
            generation,
            supervisor,
            token,
        });
    }

    /// Stop the current task's stream and clear the view. Idempotent.
    pub fn unbind(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.token.cancel();
        active.supervisor.cancel();

        let mut inner = self.shared.lock();
        inner.generation += 1;
        inner.reset(LogView::idle());
        Shared::publish(&mut inner, &self.shared.view_tx);
        debug!("Unbound reasoning log view from task {}", active.task_id);
    }

    /// Fetch the bound task's history again. No-op when unbound.
    pub fn refresh_history(&self) {
        if let Some(active) = &self.active {
            self.spawn_history_fetch(&active.task_id, active.generation, active.token.clone());
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.task_id.as_str())
    }

    /// Current view.
    pub fn snapshot(&self) -> LogView {
        self.shared.view_tx.borrow().clone()
    }

    /// Receiver of the latest published view.
    pub fn subscribe(&self) -> watch::Receiver<LogView> {
        self.shared.view_tx.subscribe()
    }

    fn spawn_history_fetch(&self, task_id: &str, generation: u64, token: CancellationToken) {
        let history = self.history.clone();
        let shared = self.shared.clone();
        let task_id = task_id.to_string();
        let fetch = {
            let mut inner = self.shared.lock();
            inner.history_fetch += 1;
            inner.history_fetch
        };

        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                result = history.fetch_history(&task_id) => result,
            };

            shared.update(generation, move |inner| {
                if inner.history_fetch != fetch {
                    debug!("Discarding superseded history response for task {}", task_id);
                    return;
                }
                inner.view.is_loading = false;
                match result {
                    Ok(entries) => {
                        debug!(
                            "Loaded {} historical log entries for task {}",
                            entries.len(),
                            task_id
                        );
                        inner.historical = entries;
                        inner.view.is_error = false;
                        inner.view.error = None;
                    }
                    Err(err) => {
                        warn!("Failed to load reasoning log for task {}: {}", task_id, err);
                        inner.view.is_error = true;
                        inner.view.error = Some(err.to_string());
                    }
                }
            });
        });
    }
}

impl Drop for ReasoningLogBinding {
    fn drop(&mut self) {
        self.unbind();
    }
}

async fn forward_supervisor_events(
    shared: Arc<Shared>,
    generation: u64,
    mut events: SupervisorEvents,
    token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            event = events.recv() => event,
        };
        let Some(event) = event else {
            break;
        };

        let applied = match event {
            SupervisorEvent::RetryScheduled { attempt, delay } => {
                debug!("Reconnect attempt {} scheduled in {:?}", attempt, delay);
                continue;
            }
            SupervisorEvent::State(state) => {
                shared.update(generation, |inner| inner.view.stream_state = state)
            }
            SupervisorEvent::Warning(warning) => {
                shared.update(generation, |inner| inner.view.stream_warning = warning)
            }
            SupervisorEvent::Log(entry) => shared.update(generation, |inner| inner.live.apply(entry)),
        };
        if !applied {
            break;
        }
    }
}
