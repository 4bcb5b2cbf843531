//! Path registry shared by the watcher handle and its pollers.
//!
//! Every registered path owns exactly one poller. The poller is identified by
//! the entry id, so a poller that outlived its registration (the path was
//! removed and added again) can never deregister its successor.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::event::FileState;

/// One registered path.
#[derive(Debug)]
struct Entry {
    id: u64,
    baseline: FileState,
    cancel: CancellationToken,
}

/// Handle given to the poller of a freshly inserted path.
#[derive(Debug, Clone)]
pub(crate) struct Registration {
    pub(crate) id: u64,
    pub(crate) cancel: CancellationToken,
}

/// Outcome of [`Registry::insert`].
#[derive(Debug)]
pub(crate) enum Insert {
    /// The path is new; a poller must be spawned with this registration.
    Added(Registration),

    /// The path was already registered; nothing changed.
    Present,

    /// The registry is at its configured limit.
    Full(usize),
}

/// Map of watched paths and rescanned directories.
///
/// Owns the root cancellation token; every poller and rescan token is a
/// child of it.
#[derive(Debug)]
pub(crate) struct Registry {
    /// Watched paths, each with one poller.
    entries: RwLock<HashMap<PathBuf, Entry>>,

    /// Directories with an active rescan task.
    directories: RwLock<HashMap<PathBuf, CancellationToken>>,

    /// Pollers that left `entries` and are still delivering their failure,
    /// keyed by poller id.
    retiring: RwLock<HashMap<u64, (PathBuf, CancellationToken)>>,

    next_id: AtomicU64,

    root: CancellationToken,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            directories: RwLock::new(HashMap::new()),
            retiring: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            root: CancellationToken::new(),
        }
    }

    /// Token cancelled only by [`Registry::shutdown`].
    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.root.clone()
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Register `path` unless it is already present.
    pub(crate) async fn insert(
        &self,
        path: PathBuf,
        baseline: FileState,
        limit: Option<usize>,
    ) -> Insert {
        let mut entries = self.entries.write().await;

        if entries.contains_key(&path) {
            return Insert::Present;
        }
        if let Some(max) = limit.filter(|max| entries.len() >= *max) {
            return Insert::Full(max);
        }

        let registration = Registration {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            cancel: self.root.child_token(),
        };
        entries.insert(
            path,
            Entry {
                id: registration.id,
                baseline,
                cancel: registration.cancel.clone(),
            },
        );

        Insert::Added(registration)
    }

    /// Deregister `path` and stop its poller, including one that is still
    /// delivering a failure for it. Returns false if absent.
    pub(crate) async fn remove(&self, path: &Path) -> bool {
        let removed = self.entries.write().await.remove(path);
        let retired = {
            let mut retiring = self.retiring.write().await;
            let before = retiring.len();
            retiring.retain(|_, (retired_path, token)| {
                if retired_path.as_path() == path {
                    token.cancel();
                    false
                } else {
                    true
                }
            });
            before != retiring.len()
        };

        match removed {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => retired,
        }
    }

    /// Move `path` out of the watch list without cancelling poller `id`.
    ///
    /// The path can be added again right away, while [`Registry::remove`]
    /// still reaches the retiring poller until [`Registry::forget`].
    pub(crate) async fn retire(&self, path: &Path, id: u64) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(path) {
            Some(entry) if entry.id == id => {
                if let Some(entry) = entries.remove(path) {
                    self.retiring
                        .write()
                        .await
                        .insert(id, (path.to_path_buf(), entry.cancel));
                }
                true
            }
            _ => false,
        }
    }

    /// Drop the retiring record of poller `id`.
    pub(crate) async fn forget(&self, id: u64) {
        self.retiring.write().await.remove(&id);
    }

    /// Deregister `path` only if it still belongs to poller `id`.
    pub(crate) async fn remove_if_owned(&self, path: &Path, id: u64) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(path) {
            Some(entry) if entry.id == id => {
                if let Some(entry) = entries.remove(path) {
                    entry.cancel.cancel();
                }
                true
            }
            _ => false,
        }
    }

    pub(crate) async fn contains(&self, path: &Path) -> bool {
        self.entries.read().await.contains_key(path)
    }

    /// Baseline state recorded when `path` was registered.
    pub(crate) async fn baseline(&self, path: &Path) -> Option<FileState> {
        self.entries.read().await.get(path).map(|e| e.baseline)
    }

    /// All registered paths, sorted.
    pub(crate) async fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.entries.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub(crate) async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Track a directory rescan task. Returns None if one already exists.
    pub(crate) async fn insert_directory(&self, path: PathBuf) -> Option<CancellationToken> {
        let mut directories = self.directories.write().await;
        if directories.contains_key(&path) {
            return None;
        }
        let token = self.root.child_token();
        directories.insert(path, token.clone());
        Some(token)
    }

    /// Stop the rescan task of `path`. Returns false if there was none.
    pub(crate) async fn remove_directory(&self, path: &Path) -> bool {
        let removed = self.directories.write().await.remove(path);
        match removed {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) async fn directory_count(&self) -> usize {
        self.directories.read().await.len()
    }

    /// Cancel every token and drop every entry.
    pub(crate) async fn shutdown(&self) {
        self.root.cancel();
        for (_, entry) in self.entries.write().await.drain() {
            entry.cancel.cancel();
        }
        for (_, token) in self.directories.write().await.drain() {
            token.cancel();
        }
        for (_, (_, token)) in self.retiring.write().await.drain() {
            token.cancel();
        }
    }
}
