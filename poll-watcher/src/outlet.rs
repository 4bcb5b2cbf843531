//! Bounded output streams with an overflow policy.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio_util::sync::CancellationToken;

use crate::config::OverflowPolicy;

/// Result of handing one item to an [`Outlet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// The item is in the channel.
    Sent,

    /// The channel was full and the policy discarded the item.
    Dropped,

    /// The sender was cancelled before the item got through.
    Cancelled,

    /// The receiver is gone.
    Closed,
}

/// Delivery counters of one stream. Outlives the senders.
#[derive(Debug, Default)]
pub(crate) struct OutletStats {
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl OutletStats {
    /// Items that reached the channel.
    pub(crate) fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Items discarded by the overflow policy.
    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Sending half of one output stream.
#[derive(Debug)]
pub(crate) struct Outlet<T> {
    tx: mpsc::Sender<T>,
    policy: OverflowPolicy,
    stats: Arc<OutletStats>,
}

impl<T> Clone for Outlet<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            policy: self.policy,
            stats: self.stats.clone(),
        }
    }
}

impl<T> Outlet<T> {
    /// Create a stream holding up to `capacity` undelivered items.
    pub(crate) fn channel(capacity: usize, policy: OverflowPolicy) -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(capacity);
        let outlet = Self {
            tx,
            policy,
            stats: Arc::new(OutletStats::default()),
        };
        (outlet, rx)
    }

    /// Hand `item` to the consumer according to the overflow policy.
    ///
    /// Never waits past cancellation of `cancel`.
    pub(crate) async fn deliver(&self, item: T, cancel: &CancellationToken) -> Delivery {
        if cancel.is_cancelled() {
            return Delivery::Cancelled;
        }

        let delivery = match self.policy {
            OverflowPolicy::Block => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Delivery::Cancelled,
                    res = self.tx.send(item) => match res {
                        Ok(()) => Delivery::Sent,
                        Err(_) => Delivery::Closed,
                    },
                }
            }
            OverflowPolicy::DropNewest => match self.tx.try_send(item) {
                Ok(()) => Delivery::Sent,
                Err(TrySendError::Full(_)) => Delivery::Dropped,
                Err(TrySendError::Closed(_)) => Delivery::Closed,
            },
            OverflowPolicy::Timeout { timeout_ms } => {
                let timeout = std::time::Duration::from_millis(timeout_ms);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Delivery::Cancelled,
                    res = self.tx.send_timeout(item, timeout) => match res {
                        Ok(()) => Delivery::Sent,
                        Err(SendTimeoutError::Timeout(_)) => Delivery::Dropped,
                        Err(SendTimeoutError::Closed(_)) => Delivery::Closed,
                    },
                }
            }
        };

        match delivery {
            Delivery::Sent => {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Delivery::Dropped => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Delivery::Cancelled | Delivery::Closed => {}
        }
        delivery
    }

    pub(crate) fn stats(&self) -> Arc<OutletStats> {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[tokio::test]
    async fn test_block_waits_for_room() {
        let (outlet, mut rx) = Outlet::channel(1, OverflowPolicy::Block);
        let cancel = CancellationToken::new();

        assert_eq!(outlet.deliver(1, &cancel).await, Delivery::Sent);

        let sender = outlet.clone();
        let token = cancel.clone();
        let pending = tokio::spawn(async move { sender.deliver(2, &token).await });

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(pending.await.unwrap(), Delivery::Sent);
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(outlet.stats().delivered(), 2);
    }

    #[tokio::test]
    async fn test_block_is_cancellable() {
        let (outlet, _rx) = Outlet::channel(1, OverflowPolicy::Block);
        let cancel = CancellationToken::new();
        outlet.deliver(1, &cancel).await;

        let sender = outlet.clone();
        let token = cancel.clone();
        let pending = tokio::spawn(async move { sender.deliver(2, &token).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        assert_eq!(pending.await.unwrap(), Delivery::Cancelled);
        assert_eq!(outlet.stats().delivered(), 1);
    }

    #[tokio::test]
    async fn test_drop_newest_never_blocks() {
        let (outlet, mut rx) = Outlet::channel(1, OverflowPolicy::DropNewest);
        let cancel = CancellationToken::new();

        assert_eq!(outlet.deliver("first", &cancel).await, Delivery::Sent);
        assert_eq!(outlet.deliver("second", &cancel).await, Delivery::Dropped);
        assert_eq!(outlet.stats().dropped(), 1);
        assert_eq!(rx.recv().await, Some("first"));
    }

    #[tokio::test]
    async fn test_timeout_drops_after_limit() {
        let (outlet, _rx) = Outlet::channel(1, OverflowPolicy::Timeout { timeout_ms: 10 });
        let cancel = CancellationToken::new();

        outlet.deliver(1, &cancel).await;
        assert_eq!(outlet.deliver(2, &cancel).await, Delivery::Dropped);
        assert_eq!(outlet.stats().dropped(), 1);
    }

    #[tokio::test]
    async fn test_closed_receiver() {
        let (outlet, rx) = Outlet::channel(4, OverflowPolicy::Block);
        drop(rx);

        let cancel = CancellationToken::new();
        assert_eq!(outlet.deliver(1, &cancel).await, Delivery::Closed);
    }
}
