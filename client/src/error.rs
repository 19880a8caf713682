//! Client error taxonomy.
//!
//! REST failures propagate to the caller as `Result`s; socket-level and
//! capability-level failures are logged and surfaced through store state
//! instead of being thrown.

/// Errors produced by client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No bearer token is configured for an operation that requires one.
    #[error("missing auth token; set MEET_TOKEN or ClientConfig::token")]
    MissingToken,

    /// The configured base URL is not an http(s) URL.
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// The HTTP request could not be performed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("api returned {status}: {body}")]
    Api { status: u16, body: String },

    /// A response body could not be decoded.
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The WebSocket connection could not be established.
    #[error("websocket connect failed: {0}")]
    WsConnect(Box<tokio_tungstenite::tungstenite::Error>),

    /// An operation that needs an adopted session was called without one.
    #[error("no active session")]
    NoSession,
}
