//! Values delivered on the watcher's output streams.

use std::fs::Metadata;
use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A detected change to a watched path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    /// Path of the changed entry, as it was registered.
    pub path: PathBuf,

    /// What happened to it.
    pub operation: Operation,

    /// When the poller noticed the change.
    pub timestamp: DateTime<Utc>,
}

impl WatchEvent {
    /// Create a new event stamped with the current time.
    pub fn new(operation: Operation, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            operation,
            timestamp: Utc::now(),
        }
    }
}

/// Kind of change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    /// The modification time changed.
    Modified,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Modified => f.write_str("MODIFIED"),
        }
    }
}

/// A watched path that stopped being stat-able while it was polled.
///
/// The path has already been deregistered when this is received; call
/// [`Watcher::add`](crate::Watcher::add) again to resume watching it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}: {message}", path.display())]
pub struct WatchFailure {
    /// Path that failed.
    pub path: PathBuf,

    /// State observed at the last successful poll.
    pub last_known: FileState,

    /// Human readable cause.
    pub message: String,
}

/// Snapshot of the metadata the watcher tracks for one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    /// Modification time; this is the change indicator.
    pub modified: Option<SystemTime>,

    /// Size in bytes. Recorded but never compared.
    pub len: u64,

    /// Whether the entry is a directory.
    pub is_dir: bool,

    /// Whether the entry is read-only.
    pub readonly: bool,
}

impl FileState {
    /// Whether `current` differs from this snapshot in a way that counts
    /// as a modification.
    pub fn changed(&self, current: &FileState) -> bool {
        self.modified != current.modified
    }
}

impl From<&Metadata> for FileState {
    fn from(metadata: &Metadata) -> Self {
        Self {
            modified: metadata.modified().ok(),
            len: metadata.len(),
            is_dir: metadata.is_dir(),
            readonly: metadata.permissions().readonly(),
        }
    }
}
