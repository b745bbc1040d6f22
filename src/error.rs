//! Error taxonomy shared by the fetcher, cache, repo and handlers.

use thiserror::Error;

/// Errors surfaced by the retrieval core.
///
/// The type is `Clone` so that a single in-flight fetch can hand the same
/// failure to every caller waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Network failure, timeout or malformed response. Retried by the fetcher.
    #[error("transient fetch error: {0}")]
    Transient(String),
    /// The remote reported an application-level failure (bad id, auth rejected).
    #[error("{0}")]
    Query(String),
    /// The requested parameter combination cannot be expressed against the API.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    /// Arguments supplied by the user could not be parsed or validated.
    #[error("{0}")]
    BadRequest(String),
    /// The query succeeded but produced nothing to choose from.
    #[error("no items found")]
    Empty,
    /// The fetcher has been shut down and takes no more calls.
    #[error("fetcher is shut down")]
    Closed,
}

impl Error {
    /// Returns `true` if retrying the same request might succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Message shown to a chat user when this error ends a request.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Transient(_) => "Request to Pixiv failed, please try again later.".to_string(),
            Self::Query(msg) | Self::BadRequest(msg) => msg.clone(),
            Self::Unsupported(msg) => format!("Unsupported request: {msg}"),
            Self::Empty => "Nothing found.".to_string(),
            Self::Closed => "The bot is shutting down.".to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Transient(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Transient(format!("failed to decode response: {e}"))
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Transient("request timed out".to_string())
    }
}

/// Result alias for retrieval operations.
pub type Result<T> = std::result::Result<T, Error>;
