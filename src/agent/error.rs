//! Error types for counter collection

use std::fmt;

/// Result type alias for counter reads
pub type CollectResult<T> = Result<T, CollectError>;

/// Errors that can occur while reading OS counters
///
/// These never leave the sampler: every read failure degrades to a fixed
/// fallback value.
#[derive(Debug)]
pub enum CollectError {
    /// Counter file could not be read
    Io(std::io::Error),

    /// Counter content had an unexpected format
    Parse(String),

    /// A system command failed or produced unusable output
    Command(String),

    /// The platform cannot provide this counter
    Unavailable(String),
}

impl fmt::Display for CollectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectError::Io(err) => write!(f, "I/O error: {}", err),
            CollectError::Parse(msg) => write!(f, "malformed counter: {}", msg),
            CollectError::Command(msg) => write!(f, "system command failed: {}", msg),
            CollectError::Unavailable(msg) => write!(f, "counter unavailable: {}", msg),
        }
    }
}

impl std::error::Error for CollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollectError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CollectError {
    fn from(err: std::io::Error) -> Self {
        CollectError::Io(err)
    }
}

impl From<tokio::task::JoinError> for CollectError {
    fn from(err: tokio::task::JoinError) -> Self {
        CollectError::Unavailable(format!("blocking query aborted: {err}"))
    }
}
