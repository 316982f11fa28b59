//! Loader error type

use thiserror::Error;

/// Why a load failed
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The thread or board no longer exists
    #[error("Not found (404)")]
    NotFound,

    /// The server answered with an unexpected status
    #[error("Server error: HTTP {0}")]
    Server(u16),

    /// The request never got a response
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The response could not be read
    #[error("Parse error: {0}")]
    Parse(String),

    /// The response contained no posts
    #[error("Thread has no posts")]
    Empty,
}

impl LoaderError {
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

impl From<serde_json::Error> for LoaderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<tokio::task::JoinError> for LoaderError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Parse(format!("post processing failed: {err}"))
    }
}
