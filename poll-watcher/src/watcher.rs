//! Watcher handle: registration, removal and shutdown.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

use crate::config::{Excludes, WatcherConfig};
use crate::error::{Result, WatchError};
use crate::event::{FileState, WatchEvent, WatchFailure};
use crate::outlet::{Outlet, OutletStats};
use crate::poller::{PollContext, Poller};
use crate::registry::{Insert, Registry};
use crate::scanner;

/// Receiving halves of the watcher's output streams.
///
/// Both streams end (`recv` returns `None`) once the watcher is closed and
/// every poller has stopped.
#[derive(Debug)]
pub struct WatchStreams {
    /// Detected modifications.
    pub events: mpsc::Receiver<WatchEvent>,

    /// Paths that stopped being stat-able.
    pub errors: mpsc::Receiver<WatchFailure>,
}

/// Polling watcher for files and directories.
///
/// Every watched path gets its own tokio task that re-stats it on the
/// configured interval and reports modification-time changes. The handle is
/// cheap to clone; all clones share the same registry and streams. Methods
/// that spawn tasks must be called from within a tokio runtime.
#[derive(Debug, Clone)]
pub struct Watcher {
    inner: Arc<Inner>,
}

#[derive(Debug)]
pub(crate) struct Inner {
    config: WatcherConfig,
    excludes: Excludes,
    pub(crate) registry: Arc<Registry>,

    /// Senders handed to new pollers. None once closed.
    context: RwLock<Option<PollContext>>,

    event_stats: Arc<OutletStats>,
    failure_stats: Arc<OutletStats>,
}

impl Watcher {
    /// Create a watcher with the default configuration.
    pub fn new() -> (Self, WatchStreams) {
        Self::build(WatcherConfig::default(), Excludes::default())
    }

    /// Create a watcher with a custom configuration.
    pub fn with_config(config: WatcherConfig) -> Result<(Self, WatchStreams)> {
        config.validate()?;
        let excludes = Excludes::new(config.compile_excludes()?);
        Ok(Self::build(config, excludes))
    }

    fn build(config: WatcherConfig, excludes: Excludes) -> (Self, WatchStreams) {
        let (events, events_rx) = Outlet::channel(config.channel_capacity, config.overflow);
        let (errors, errors_rx) = Outlet::channel(config.channel_capacity, config.overflow);
        let registry = Arc::new(Registry::new());

        let inner = Inner {
            excludes,
            registry: registry.clone(),
            event_stats: events.stats(),
            failure_stats: errors.stats(),
            context: RwLock::new(Some(PollContext {
                registry,
                events,
                errors,
                interval: config.poll_interval(),
            })),
            config,
        };

        let watcher = Self {
            inner: Arc::new(inner),
        };
        let streams = WatchStreams {
            events: events_rx,
            errors: errors_rx,
        };
        (watcher, streams)
    }

    /// Start watching a file, or every immediate child of a directory.
    ///
    /// Returns how many paths were newly placed under watch; re-adding a
    /// watched path is a no-op that returns 0. Children of a directory that
    /// cannot be stat'ed are skipped with a warning.
    pub async fn add(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let context = self.inner.context().await?;

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| WatchError::unavailable(path, e))?;

        if !metadata.is_dir() {
            let added = self
                .inner
                .watch(&context, path.to_path_buf(), FileState::from(&metadata))
                .await?;
            if added {
                info!("Watching file: {}", path.display());
                return Ok(1);
            }
            debug!("Already watching: {}", path.display());
            return Ok(0);
        }

        let added = self.inner.add_children(&context, path).await?;
        info!("Watching {added} new entries in: {}", path.display());

        if let Some(interval) = self.inner.config.rescan_interval() {
            let dir = path.to_path_buf();
            if let Some(cancel) = self.inner.registry.insert_directory(dir.clone()).await {
                tokio::spawn(scanner::rescan(
                    Arc::downgrade(&self.inner),
                    dir.clone(),
                    interval,
                    cancel,
                ));
            }
            if self.inner.registry.is_shut_down() {
                self.inner.registry.remove_directory(&dir).await;
            }
        }

        if self.inner.registry.is_shut_down() {
            return Err(WatchError::Closed);
        }
        Ok(added)
    }

    /// Stop watching `path`. Unknown paths are ignored.
    ///
    /// For a directory this stops its rescan task; children stay watched
    /// until removed one by one.
    pub async fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let file = self.inner.registry.remove(path).await;
        let dir = self.inner.registry.remove_directory(path).await;

        if file || dir {
            info!("Removed from watch: {}", path.display());
        }
    }

    /// Stop every poller and end both output streams.
    ///
    /// Items already buffered can still be received. Further calls to
    /// [`add`](Self::add) return [`WatchError::Closed`].
    pub async fn close(&self) {
        let context = self.inner.context.write().await.take();
        self.inner.registry.shutdown().await;

        if context.is_some() {
            info!("Watcher closed");
        }
    }

    /// Whether `path` is currently watched.
    pub async fn is_watching(&self, path: impl AsRef<Path>) -> bool {
        self.inner.registry.contains(path.as_ref()).await
    }

    /// State recorded when `path` was registered.
    pub async fn baseline(&self, path: impl AsRef<Path>) -> Option<FileState> {
        self.inner.registry.baseline(path.as_ref()).await
    }

    /// All watched paths, sorted.
    pub async fn watched_paths(&self) -> Vec<PathBuf> {
        self.inner.registry.paths().await
    }

    /// Number of watched paths.
    pub async fn len(&self) -> usize {
        self.inner.registry.len().await
    }

    /// Whether nothing is watched.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.registry.is_shut_down()
    }

    /// The configuration in use.
    pub fn config(&self) -> &WatcherConfig {
        &self.inner.config
    }

    /// Get statistics about the watcher.
    pub async fn stats(&self) -> WatcherStats {
        WatcherStats {
            watched_paths: self.inner.registry.len().await,
            scanned_directories: self.inner.registry.directory_count().await,
            events_emitted: self.inner.event_stats.delivered(),
            failures_emitted: self.inner.failure_stats.delivered(),
            dropped: self.inner.event_stats.dropped() + self.inner.failure_stats.dropped(),
        }
    }
}

impl Inner {
    /// Senders for a new poller, or `Closed`.
    pub(crate) async fn context(&self) -> Result<PollContext> {
        self.context.read().await.clone().ok_or(WatchError::Closed)
    }

    /// Register one path and spawn its poller. Returns false if it was
    /// already watched.
    /// Fails with `Closed` if the watcher was closed while `context` was
    /// held, leaving nothing registered.
    async fn watch(&self, context: &PollContext, path: PathBuf, state: FileState) -> Result<bool> {
        match self.registry.insert(path.clone(), state, self.config.max_watches).await {
            Insert::Added(registration) => {
                if self.registry.is_shut_down() {
                    self.registry.remove_if_owned(&path, registration.id).await;
                    return Err(WatchError::Closed);
                }
                Poller::new(path, state, registration, context.clone()).spawn();
                Ok(true)
            }
            Insert::Present => Ok(false),
            Insert::Full(max) => Err(WatchError::WatchLimitExceeded(max)),
        }
    }

    /// Watch every child of `dir` not yet watched. Returns how many were added.
    pub(crate) async fn add_children(&self, context: &PollContext, dir: &Path) -> Result<usize> {
        let listed_dir = dir.to_path_buf();
        let excludes = self.excludes.clone();
        let children = tokio::task::spawn_blocking(move || {
            scanner::list_children(&listed_dir, &excludes)
        })
        .await
        .map_err(io::Error::other)?
        .map_err(|e| WatchError::unavailable(dir, e))?;

        let mut added = 0;
        for child in children {
            let metadata = match tokio::fs::metadata(&child).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Error adding file to watch list: {}: {e}", child.display());
                    continue;
                }
            };

            match self.watch(context, child.clone(), FileState::from(&metadata)).await {
                Ok(true) => {
                    debug!("Watching file: {}", child.display());
                    added += 1;
                }
                Ok(false) => {}
                Err(WatchError::Closed) => return Err(WatchError::Closed),
                Err(e) => {
                    warn!("Not watching remaining entries of {}: {e}", dir.display());
                    break;
                }
            }
        }

        Ok(added)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.registry.shutdown_token().cancel();
    }
}

/// Statistics about the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherStats {
    /// Paths with an active poller.
    pub watched_paths: usize,

    /// Directories with an active rescan task.
    pub scanned_directories: usize,

    /// Events that reached the event stream.
    pub events_emitted: u64,

    /// Failures that reached the error stream.
    pub failures_emitted: u64,

    /// Items discarded by the overflow policy on either stream.
    pub dropped: u64,
}
