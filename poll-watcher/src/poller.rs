//! The per-path poll loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::event::{FileState, Operation, WatchEvent, WatchFailure};
use crate::outlet::{Delivery, Outlet};
use crate::registry::{Registration, Registry};

/// Everything a poller shares with its siblings.
#[derive(Debug, Clone)]
pub(crate) struct PollContext {
    pub(crate) registry: Arc<Registry>,
    pub(crate) events: Outlet<WatchEvent>,
    pub(crate) errors: Outlet<WatchFailure>,
    pub(crate) interval: Duration,
}

/// Polls one path until it disappears or its registration is cancelled.
#[derive(Debug)]
pub(crate) struct Poller {
    path: PathBuf,
    state: FileState,
    registration: Registration,
    context: PollContext,
}

impl Poller {
    pub(crate) fn new(
        path: PathBuf,
        state: FileState,
        registration: Registration,
        context: PollContext,
    ) -> Self {
        Self {
            path,
            state,
            registration,
            context,
        }
    }

    /// Run the loop on the current tokio runtime.
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let cancel = self.registration.cancel.clone();
        debug!("Polling {} every {:?}", self.path.display(), self.context.interval);

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let metadata = match tokio::fs::metadata(&self.path).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    self.fail(e.to_string()).await;
                    return;
                }
            };

            let current = FileState::from(&metadata);
            if self.state.changed(&current) {
                self.state = current;
                let event = WatchEvent::new(Operation::Modified, &self.path);
                match self.context.events.deliver(event, &cancel).await {
                    Delivery::Sent => debug!("Modified: {}", self.path.display()),
                    Delivery::Dropped => {
                        warn!("Event stream full, dropped change of {}", self.path.display())
                    }
                    Delivery::Cancelled => break,
                    Delivery::Closed => {
                        debug!("Event stream closed, stop polling {}", self.path.display());
                        break;
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.context.interval) => {}
            }
        }

        self.deregister().await;
        debug!("Stopped polling {}", self.path.display());
    }

    /// Report a failed stat and leave the registry.
    ///
    /// The entry is retired before the failure is delivered, so a consumer
    /// that reacts to the failure by re-adding the path starts a new poller.
    /// A `remove` of the path still cancels a delivery that is blocked on a
    /// full stream.
    async fn fail(self, message: String) {
        let registry = &self.context.registry;
        let id = self.registration.id;
        registry.retire(&self.path, id).await;

        let failure = WatchFailure {
            path: self.path.clone(),
            last_known: self.state,
            message,
        };
        match self
            .context
            .errors
            .deliver(failure, &self.registration.cancel)
            .await
        {
            Delivery::Sent => debug!("Watch failed: {}", self.path.display()),
            Delivery::Dropped => {
                warn!("Error stream full, dropped failure of {}", self.path.display())
            }
            Delivery::Cancelled => {
                debug!("Failure of {} discarded, no longer watched", self.path.display())
            }
            Delivery::Closed => {}
        }

        registry.forget(id).await;
    }

    async fn deregister(&self) {
        self.context
            .registry
            .remove_if_owned(&self.path, self.registration.id)
            .await;
    }
}
