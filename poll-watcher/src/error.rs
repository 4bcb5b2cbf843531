//! Error types for the poll watcher.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, WatchError>;

/// Errors returned synchronously by watcher operations.
///
/// Failures detected while polling are not reported here; they arrive on the
/// failure stream as [`WatchFailure`](crate::WatchFailure) values.
#[derive(Error, Debug)]
pub enum WatchError {
    /// The path could not be stat'ed or enumerated when it was added.
    #[error("path unavailable: {}: {source}", path.display())]
    PathUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Watch limit exceeded.
    #[error("watch limit exceeded: {0} paths already watched")]
    WatchLimitExceeded(usize),

    /// The watcher has been closed.
    #[error("watcher is closed")]
    Closed,

    /// Invalid exclude pattern.
    #[error("invalid exclude pattern: {0}")]
    InvalidPattern(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatchError {
    pub(crate) fn unavailable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::PathUnavailable {
            path: path.into(),
            source,
        }
    }
}
