//! Test utilities: an in-process orchestrator serving history and SSE.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::StreamExt;
use taskdeck::api::TaskdeckClient;
use taskdeck::config::AuthConfig;
use taskdeck::stream::Backoff;
use taskdeck_protocol::{LogStreamPayload, ReasoningLogEntry};

/// Backoff short enough to keep reconnect tests fast on a real clock.
pub fn fast_backoff() -> Backoff {
    Backoff {
        initial: Duration::from_millis(20),
        max_exponent: 4,
        max_delay: Duration::from_millis(200),
    }
}

pub fn entry(id: &str, sequence: i64, status: &str) -> ReasoningLogEntry {
    ReasoningLogEntry::new(id, sequence, format!("2025-01-01T00:00:{sequence:02}Z"))
        .with_status(status)
        .with_event_type("step")
        .with_message(format!("{id} is {status}"))
}

/// SSE frame carrying one log entry.
pub fn log_frame(entry: &ReasoningLogEntry) -> String {
    LogStreamPayload { log: entry.clone() }
        .to_frame()
        .expect("Failed to encode log frame")
}

/// What one stream connection answers with.
#[derive(Debug, Clone)]
pub struct StreamScript {
    status: StatusCode,
    chunks: Vec<String>,
    hold_open: bool,
}

impl StreamScript {
    /// Send `chunks`, then close the body.
    pub fn closing(chunks: Vec<String>) -> Self {
        Self {
            status: StatusCode::OK,
            chunks,
            hold_open: false,
        }
    }

    /// Send `chunks`, then keep the connection open.
    pub fn open(chunks: Vec<String>) -> Self {
        Self {
            status: StatusCode::OK,
            chunks,
            hold_open: true,
        }
    }

    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            chunks: Vec::new(),
            hold_open: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub task_id: String,
    pub headers: HeaderMap,
}

#[derive(Default)]
struct MockState {
    history: Mutex<Option<Vec<ReasoningLogEntry>>>,
    scripts: Mutex<VecDeque<StreamScript>>,
    history_requests: Mutex<Vec<RecordedRequest>>,
    stream_requests: Mutex<Vec<RecordedRequest>>,
}

/// Orchestrator stand-in bound to an ephemeral local port.
pub struct MockOrchestrator {
    pub base_url: String,
    state: Arc<MockState>,
}

impl MockOrchestrator {
    /// Serve `history` (or a 500 when `None`) and the scripted stream
    /// connections in order. Connections past the script stay open silently.
    pub async fn start(
        history: Option<Vec<ReasoningLogEntry>>,
        scripts: Vec<StreamScript>,
    ) -> Self {
        let state = Arc::new(MockState {
            history: Mutex::new(history),
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        });

        let app = Router::new()
            .route("/health", get(|| async { Json(serde_json::json!({ "status": "ok" })) }))
            .route("/api/tasks/{task_id}/reasoning-logs", get(history_handler))
            .route("/api/tasks/{task_id}/reasoning-logs/stream", get(stream_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to read local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn client(&self) -> TaskdeckClient {
        TaskdeckClient::new(&self.base_url, AuthConfig::default())
    }

    pub fn client_with_auth(&self, auth: AuthConfig) -> TaskdeckClient {
        TaskdeckClient::new(&self.base_url, auth)
    }

    pub fn stream_requests(&self) -> Vec<RecordedRequest> {
        self.state.stream_requests.lock().unwrap().clone()
    }

    pub fn history_requests(&self) -> Vec<RecordedRequest> {
        self.state.history_requests.lock().unwrap().clone()
    }
}

async fn history_handler(
    State(state): State<Arc<MockState>>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state
        .history_requests
        .lock()
        .unwrap()
        .push(RecordedRequest { task_id, headers });

    match state.history.lock().unwrap().clone() {
        Some(entries) => Json(entries).into_response(),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "history unavailable").into_response(),
    }
}

async fn stream_handler(
    State(state): State<Arc<MockState>>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state
        .stream_requests
        .lock()
        .unwrap()
        .push(RecordedRequest { task_id, headers });

    let script = state
        .scripts
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| StreamScript::open(Vec::new()));

    if !script.status.is_success() {
        return script.status.into_response();
    }

    let chunks = futures::stream::iter(script.chunks.into_iter().map(Ok::<_, Infallible>));
    let body = if script.hold_open {
        Body::from_stream(chunks.chain(futures::stream::pending()))
    } else {
        Body::from_stream(chunks)
    };

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .unwrap()
}
