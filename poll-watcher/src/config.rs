//! Configuration types for the poll watcher.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WatchError};

/// Default delay between two stats of the same path.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default buffer size of each output stream.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 128;

/// Configuration for a [`Watcher`](crate::Watcher).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Delay between two polls of one path, in milliseconds.
    ///
    /// Lower values detect changes sooner at the cost of more stat calls.
    pub poll_interval_ms: u64,

    /// Number of items each output stream buffers before the overflow
    /// policy applies.
    pub channel_capacity: usize,

    /// What a poller does when its output stream is full.
    pub overflow: OverflowPolicy,

    /// Glob patterns for directory children that should not be watched.
    pub exclude_patterns: Vec<String>,

    /// Upper bound on simultaneously watched paths (None = unlimited).
    pub max_watches: Option<usize>,

    /// Re-enumerate watched directories on this interval and pick up new
    /// children. Disabled when None.
    pub rescan_interval_ms: Option<u64>,
}

impl WatcherConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            overflow: OverflowPolicy::default(),
            exclude_patterns: Vec::new(),
            max_watches: None,
            rescan_interval_ms: None,
        }
    }

    /// Set the poll interval, in whole milliseconds.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = millis(interval);
        self
    }

    /// Set the output stream capacity.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set the overflow policy.
    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Add an exclude pattern.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }

    /// Limit the number of watched paths.
    pub fn with_max_watches(mut self, max: usize) -> Self {
        self.max_watches = Some(max);
        self
    }

    /// Enable periodic directory rescans, in whole milliseconds.
    pub fn with_rescan_interval(mut self, interval: Duration) -> Self {
        self.rescan_interval_ms = Some(millis(interval));
        self
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Rescan interval as a duration, if enabled.
    pub fn rescan_interval(&self) -> Option<Duration> {
        self.rescan_interval_ms.map(Duration::from_millis)
    }

    /// Check the config for values the watcher cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(WatchError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(WatchError::Config(
                "channel_capacity must be greater than zero".to_string(),
            ));
        }
        if self.rescan_interval_ms == Some(0) {
            return Err(WatchError::Config(
                "rescan_interval_ms must be greater than zero".to_string(),
            ));
        }
        if let OverflowPolicy::Timeout { timeout_ms: 0 } = self.overflow {
            return Err(WatchError::Config(
                "overflow timeout_ms must be greater than zero".to_string(),
            ));
        }
        self.compile_excludes()?;
        Ok(())
    }

    pub(crate) fn compile_excludes(&self) -> Result<Vec<glob::Pattern>> {
        self.exclude_patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|e| WatchError::InvalidPattern(format!("{p}: {e}")))
            })
            .collect()
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// What a poller does when the output stream it writes to is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait until the consumer makes room. A slow consumer stalls every
    /// poller writing to the same stream, but nothing is lost.
    Block,

    /// Drop the item that did not fit and keep polling.
    DropNewest,

    /// Wait up to `timeout_ms`, then drop the item.
    Timeout { timeout_ms: u64 },
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        Self::Block
    }
}

fn millis(interval: Duration) -> u64 {
    u64::try_from(interval.as_millis()).unwrap_or(u64::MAX)
}

/// Compiled exclude patterns.
#[derive(Debug, Clone, Default)]
pub(crate) struct Excludes {
    patterns: Vec<glob::Pattern>,
}

impl Excludes {
    pub(crate) fn new(patterns: Vec<glob::Pattern>) -> Self {
        Self { patterns }
    }

    /// Check if a path should be excluded.
    pub(crate) fn matches(&self, path: &Path) -> bool {
        self.patterns.iter().any(|p| p.matches_path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_config_builder() {
        let config = WatcherConfig::new()
            .with_poll_interval(Duration::from_millis(250))
            .with_channel_capacity(4)
            .with_overflow(OverflowPolicy::DropNewest)
            .with_max_watches(10);

        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.channel_capacity, 4);
        assert_eq!(config.overflow, OverflowPolicy::DropNewest);
        assert_eq!(config.max_watches, Some(10));
        assert_eq!(config.rescan_interval(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let zero_interval = WatcherConfig {
            poll_interval_ms: 0,
            ..WatcherConfig::default()
        };
        assert!(matches!(zero_interval.validate(), Err(WatchError::Config(_))));

        let zero_capacity = WatcherConfig::new().with_channel_capacity(0);
        assert!(matches!(zero_capacity.validate(), Err(WatchError::Config(_))));

        let zero_timeout =
            WatcherConfig::new().with_overflow(OverflowPolicy::Timeout { timeout_ms: 0 });
        assert!(matches!(zero_timeout.validate(), Err(WatchError::Config(_))));
    }

    #[test]
    fn test_intervals_are_whole_milliseconds() {
        let config = WatcherConfig::new()
            .with_poll_interval(Duration::MAX)
            .with_rescan_interval(Duration::from_micros(1500));

        assert_eq!(config.poll_interval_ms, u64::MAX);
        assert_eq!(config.rescan_interval(), Some(Duration::from_millis(1)));

        let sub_millisecond = WatcherConfig::new().with_poll_interval(Duration::from_micros(10));
        assert!(matches!(sub_millisecond.validate(), Err(WatchError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let config = WatcherConfig::new().exclude("[unclosed");
        assert!(matches!(
            config.validate(),
            Err(WatchError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_exclude_patterns() {
        let config = WatcherConfig::new().exclude("**/*.swp").exclude("**/.git");
        let excludes = Excludes::new(config.compile_excludes().unwrap());

        assert!(excludes.matches(Path::new("/test/.notes.txt.swp")));
        assert!(excludes.matches(Path::new("/test/.git")));
        assert!(!excludes.matches(Path::new("/test/notes.txt")));
    }

    #[test]
    fn test_partial_config_deserializes() {
        let config: WatcherConfig = serde_json::from_str(
            r#"{"poll_interval_ms": 50, "overflow": {"policy": "timeout", "timeout_ms": 20}}"#,
        )
        .unwrap();

        assert_eq!(config.poll_interval_ms, 50);
        assert_eq!(config.overflow, OverflowPolicy::Timeout { timeout_ms: 20 });
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert!(config.exclude_patterns.is_empty());
    }
}
