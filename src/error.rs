//! Error types for polling and preference storage.

use thiserror::Error;

/// Errors that can occur while fetching a status snapshot.
///
/// Every variant is a transport-level failure: the poller records it,
/// marks the link as disconnected and keeps polling at the configured
/// interval.
#[derive(Debug, Error)]
pub enum PollError {
    /// Connection to the status endpoint failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Endpoint answered with a non-2xx status.
    #[error("HTTP {0}")]
    Http(u16),

    /// No response within one poll interval.
    #[error("Request timed out")]
    Timeout,

    /// Response body was not valid JSON.
    #[error("Failed to parse response: {0}")]
    Decode(String),
}

impl PollError {
    /// True for malformed response bodies, false for connectivity failures.
    pub fn is_decode(&self) -> bool {
        matches!(self, PollError::Decode(_))
    }
}

impl From<reqwest::Error> for PollError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PollError::Timeout
        } else if err.is_decode() {
            PollError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            PollError::Http(status.as_u16())
        } else {
            PollError::Connection(err.to_string())
        }
    }
}

/// Errors reported by a [`PrefsStore`](crate::prefs::PrefsStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded or decoded.
    #[error("Invalid record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The store cannot be used at all (e.g. poisoned or read-only).
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
