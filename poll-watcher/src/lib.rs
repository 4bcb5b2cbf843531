//! # Poll Watcher
//!
//! File and directory change notification by periodic re-stat.
//!
//! Callers register paths with [`Watcher::add`]. Each watched path gets its
//! own polling task that compares the modification time against the last
//! value it saw and reports changes on a shared event stream. A path that
//! can no longer be stat'ed is reported once on the error stream and
//! dropped from the watch list.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Watcher                                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  add(path) ──► Registry ──► Poller (one per path)               │
//! │                   │             │                               │
//! │                   ▼             ▼                               │
//! │            CancellationToken   Outlet ──► events / errors       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use poll_watcher::Watcher;
//!
//! let (watcher, mut streams) = Watcher::new();
//! watcher.add("/etc/myapp/config.toml").await?;
//!
//! loop {
//!     tokio::select! {
//!         Some(event) = streams.events.recv() => reload_config(&event.path),
//!         Some(failure) = streams.errors.recv() => tracing::warn!("{failure}"),
//!         else => break,
//!     }
//! }
//! ```
//!
//! ## Limitations
//!
//! Directories are watched one level deep, and only the children present
//! when [`Watcher::add`] runs are picked up unless
//! [`WatcherConfig::rescan_interval_ms`] is set. Two modifications within
//! one poll interval produce a single event.

pub mod config;
pub mod error;
pub mod event;
mod outlet;
mod poller;
mod registry;
mod scanner;
pub mod watcher;

pub use config::{OverflowPolicy, WatcherConfig};
pub use error::{Result, WatchError};
pub use event::{FileState, Operation, WatchEvent, WatchFailure};
pub use watcher::{WatchStreams, Watcher, WatcherStats};
