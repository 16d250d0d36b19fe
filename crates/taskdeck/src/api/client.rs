//! HTTP client for the orchestrator's REST API.

use async_trait::async_trait;
use log::debug;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use taskdeck_protocol::ReasoningLogEntry;

use crate::config::{AppConfig, AuthConfig};
use crate::error::{ApiError, ApiResult};

/// Header used to impersonate a user on development servers.
pub const DEV_USER_HEADER: &str = "X-Dev-User";

/// Supplies the historical reasoning log for a task.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch_history(&self, task_id: &str) -> ApiResult<Vec<ReasoningLogEntry>>;
}

/// Client for the orchestrator API.
#[derive(Debug, Clone)]
pub struct TaskdeckClient {
    base_url: String,
    client: reqwest::Client,
    auth: AuthConfig,
}

impl TaskdeckClient {
    pub fn new(base_url: &str, auth: AuthConfig) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            auth,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.server.url, config.auth.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn history_url(&self, task_id: &str) -> String {
        self.url(&format!(
            "/api/tasks/{}/reasoning-logs",
            urlencoding::encode(task_id)
        ))
    }

    pub fn stream_url(&self, task_id: &str) -> String {
        self.url(&format!(
            "/api/tasks/{}/reasoning-logs/stream",
            urlencoding::encode(task_id)
        ))
    }

    fn with_auth_headers(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = self.auth.token.as_ref() {
            req.bearer_auth(token)
        } else if let Some(user) = self.auth.dev_user.as_ref() {
            req.header(DEV_USER_HEADER, user)
        } else {
            req
        }
    }

    /// Unsent request for a task's live stream.
    pub fn stream_request(&self, task_id: &str) -> reqwest::RequestBuilder {
        let req = self
            .client
            .get(self.stream_url(task_id))
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        self.with_auth_headers(req)
    }

    pub async fn get(&self, path: &str) -> ApiResult<reqwest::Response> {
        let url = self.url(path);
        self.send(&url, self.client.get(&url)).await
    }

    /// Check the server's health endpoint.
    pub async fn health(&self) -> ApiResult<()> {
        self.get("/health").await.map(|_| ())
    }

    pub async fn reasoning_logs(&self, task_id: &str) -> ApiResult<Vec<ReasoningLogEntry>> {
        let url = self.history_url(task_id);
        let response = self.send(&url, self.client.get(&url)).await?;
        let entries: Vec<ReasoningLogEntry> =
            response
                .json()
                .await
                .map_err(|source| ApiError::Decode {
                    url: url.clone(),
                    source,
                })?;
        debug!("Fetched {} reasoning log entries from {}", entries.len(), url);
        Ok(entries)
    }

    async fn send(&self, url: &str, req: reqwest::RequestBuilder) -> ApiResult<reqwest::Response> {
        let response = self
            .with_auth_headers(req)
            .send()
            .await
            .map_err(|source| ApiError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                url: url.to_string(),
                status,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl HistorySource for TaskdeckClient {
    async fn fetch_history(&self, task_id: &str) -> ApiResult<Vec<ReasoningLogEntry>> {
        self.reasoning_logs(task_id).await
    }
}
