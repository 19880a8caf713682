//! Client configuration.
//!
//! Environment-driven with sensible localhost defaults; binaries load a
//! `.env` first. Token *storage* is the caller's concern — the config only
//! carries whatever token it was given.

use std::time::Duration;

use crate::error::ClientError;

/// How often the periodic sender emits the latest known position.
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(3);

/// Connection settings shared by the REST client and the transport.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// REST base URL, e.g. `http://127.0.0.1:3000`.
    pub base_url: String,
    /// Bearer token, if authenticated.
    pub token: Option<String>,
    /// Pacing of the periodic position sender.
    pub send_interval: Duration,
}

impl ClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self { base_url: base_url.into(), token, send_interval: DEFAULT_SEND_INTERVAL }
    }

    /// Build a config from `MEET_BASE_URL` and `MEET_TOKEN`.
    #[must_use]
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("MEET_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".to_owned());
        let token = std::env::var("MEET_TOKEN").ok().filter(|t| !t.is_empty());
        Self::new(base_url, token)
    }

    /// The session socket URL, carrying the session id and bearer token as
    /// query parameters.
    ///
    /// # Errors
    ///
    /// [`ClientError::MissingToken`] without a token,
    /// [`ClientError::InvalidBaseUrl`] for a non-http(s) base URL.
    pub fn ws_session_url(&self, session_id: i64) -> Result<String, ClientError> {
        let token = self.token.as_deref().ok_or(ClientError::MissingToken)?;
        let host = if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest.trim_end_matches('/'))
        } else if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest.trim_end_matches('/'))
        } else {
            return Err(ClientError::InvalidBaseUrl(self.base_url.clone()));
        };
        Ok(format!("{host}/ws/session?sessionId={session_id}&token={token}"))
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
