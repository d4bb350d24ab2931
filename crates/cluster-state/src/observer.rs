//! Waiting for conditions over the cluster state
//!
//! A [`ClusterStateObserver`] holds its own subscription to the state
//! broadcast. It evaluates a predicate against the current state and then
//! against every newly published state until the predicate holds, the
//! deadline passes, or the cluster service shuts down. Exactly one of these
//! outcomes is reported, and the subscription is released with it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::service::ClusterService;
use crate::state::ClusterState;

/// Outcome of an observation
#[derive(Debug, Clone)]
pub enum ObservedState {
    /// The predicate held for this state
    Matched(Arc<ClusterState>),
    /// The deadline passed; carries the last observed state
    TimedOut(Arc<ClusterState>),
    /// The cluster service shut down
    Closed,
}

/// Callbacks for [`ClusterStateObserver::register`].
///
/// Each method consumes the listener, so exactly one of them runs. They run
/// on the observer's task and must not block.
pub trait ObserverListener: Send + 'static {
    /// The predicate held for `state`
    fn on_new_cluster_state(self, state: Arc<ClusterState>);

    /// The deadline passed before the predicate held
    fn on_timeout(self, last_observed: Arc<ClusterState>);

    /// The cluster service shut down before the predicate held
    fn on_cluster_service_close(self);
}

/// A single-use wait for a condition over the cluster state
#[derive(Debug)]
pub struct ClusterStateObserver {
    receiver: watch::Receiver<Arc<ClusterState>>,
    timeout: Option<Duration>,
}

impl ClusterStateObserver {
    /// Create an observer subscribed to `service`.
    ///
    /// Without a timeout the observer waits until a match or shutdown.
    pub fn new<S>(service: &S, timeout: Option<Duration>) -> Self
    where
        S: ClusterService + ?Sized,
    {
        Self::from_receiver(service.subscribe(), timeout)
    }

    /// Create an observer from an existing subscription
    #[must_use]
    pub const fn from_receiver(
        receiver: watch::Receiver<Arc<ClusterState>>,
        timeout: Option<Duration>,
    ) -> Self {
        Self { receiver, timeout }
    }

    /// Wait until `predicate` holds.
    ///
    /// The current state is checked first, so an already satisfied predicate
    /// resolves without waiting for a transition.
    pub async fn wait_for<P>(mut self, mut predicate: P) -> ObservedState
    where
        P: FnMut(&ClusterState) -> bool + Send,
    {
        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        loop {
            let state = self.receiver.borrow_and_update().clone();
            if predicate(&state) {
                return ObservedState::Matched(state);
            }

            let changed = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, self.receiver.changed()).await {
                        Ok(changed) => changed,
                        Err(_) => {
                            debug!(
                                "Timed out observing cluster state at version {}",
                                state.version()
                            );
                            return ObservedState::TimedOut(state);
                        }
                    }
                }
                None => self.receiver.changed().await,
            };

            if changed.is_err() {
                debug!("Cluster service closed while observing cluster state");
                return ObservedState::Closed;
            }
        }
    }

    /// Wait for `predicate` on a spawned task and report to `listener`
    pub fn register<P, L>(self, predicate: P, listener: L) -> JoinHandle<()>
    where
        P: FnMut(&ClusterState) -> bool + Send + 'static,
        L: ObserverListener,
    {
        tokio::spawn(async move {
            match self.wait_for(predicate).await {
                ObservedState::Matched(state) => listener.on_new_cluster_state(state),
                ObservedState::TimedOut(state) => listener.on_timeout(state),
                ObservedState::Closed => listener.on_cluster_service_close(),
            }
        })
    }
}
