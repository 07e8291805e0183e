use thiserror::Error;

/// Errors returned by a [`crate::SearchSink`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The engine could not be reached or the connection broke mid-request.
    #[error("Search engine unreachable: {0}")]
    Transport(String),

    /// The engine refused the whole request because of load (HTTP 429).
    #[error("Search engine rate limited the request: {0}")]
    RateLimited(String),

    /// The engine answered with a non-retriable error for the whole request.
    #[error("Search engine rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },
}

impl SinkError {
    /// Whether retrying the same request later can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SinkError::Transport(_) | SinkError::RateLimited(_) => true,
            SinkError::Rejected { status, .. } => *status >= 500,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SinkError::RateLimited(_))
    }
}
