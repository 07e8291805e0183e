use thiserror::Error;

/// Broad class of a query failure, reported to API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The request itself is wrong; retrying it unchanged will fail again
    Validation,
    /// The search engine could not be reached
    Unavailable,
    /// The search engine failed while executing a valid request
    Engine,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Unavailable => "unavailable",
            ErrorCategory::Engine => "engine",
        }
    }
}

/// Errors returned by the query layer.
///
/// Messages never contain credentials or engine internals beyond the
/// engine's own error reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Index '{0}' not found")]
    UnknownIndex(String),

    #[error("Search engine unreachable: {0}")]
    Transport(String),

    #[error("Search engine error: {0}")]
    Engine(String),
}

impl QueryError {
    pub fn validation(message: impl Into<String>) -> Self {
        QueryError::Validation(message.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            QueryError::Validation(_)
            | QueryError::InvalidCursor(_)
            | QueryError::UnknownIndex(_) => ErrorCategory::Validation,
            QueryError::Transport(_) => ErrorCategory::Unavailable,
            QueryError::Engine(_) => ErrorCategory::Engine,
        }
    }
}
