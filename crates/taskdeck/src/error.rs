//! Error types for the reasoning-log client.

use reqwest::StatusCode;
use thiserror::Error;

/// Result type for live stream operations.
pub type StreamResult<T> = Result<T, StreamError>;

/// Result type for REST calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Why a stream session ended.
///
/// Every variant is recoverable: the supervisor reconnects after any of them.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Connecting or reading the body failed.
    #[error("stream transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The stream endpoint answered with a non-success status.
    #[error("stream endpoint returned {0}")]
    Status(StatusCode),

    /// Frame data was not valid JSON.
    #[error("malformed stream payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The server closed the stream.
    #[error("stream ended unexpectedly")]
    StreamEnded,

    /// The session producer went away without reporting a cause.
    #[error("stream session closed")]
    SessionClosed,
}

/// Errors from the REST API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}")]
    Status { url: String, status: StatusCode },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Error reported by a non-HTTP history source.
    #[error("{0}")]
    Other(String),
}
