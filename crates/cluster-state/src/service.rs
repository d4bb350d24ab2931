//! Abstract interface to the cluster-state commit primitive.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::settings::ClusterSettings;
use crate::state::ClusterState;
use crate::ClusterStateResult;

/// A state-update task.
///
/// Receives the state current at application time and returns the next state,
/// or an error that rejects the task and leaves the state untouched.
pub type StateUpdateTask =
    Box<dyn FnOnce(&ClusterState) -> ClusterStateResult<ClusterState> + Send + 'static>;

/// A hook run by the cluster service after every applied task, before the new
/// state is published.
pub trait StateReconciler: Send + Sync + 'static {
    /// Derive the state to publish from the state a task produced
    fn reconcile(&self, state: ClusterState) -> ClusterState;
}

/// The consensus/commit primitive the control plane is built on.
///
/// Tasks are applied one at a time in submission order. Every applied task
/// produces a new state which is broadcast to subscribers. A state's
/// *accepted* voting configuration becomes *committed* once the primitive
/// has made it durable.
#[async_trait]
pub trait ClusterService: Send + Sync + 'static {
    /// The most recently published state.
    fn state(&self) -> Arc<ClusterState>;

    /// Subscribe to published states.
    ///
    /// The receiver observes the current state first. Its sender is dropped
    /// when the service shuts down.
    fn subscribe(&self) -> watch::Receiver<Arc<ClusterState>>;

    /// Dynamic settings of the cluster.
    fn settings(&self) -> &ClusterSettings;

    /// Submit a state-update task and wait until it is applied.
    ///
    /// # Arguments
    /// * `source`: Label of the task, used in logs and errors.
    /// * `task`: The task to run against the state current at application.
    ///
    /// # Errors
    ///
    /// Returns the task's own error unchanged if it rejects the state, or
    /// [`crate::ClusterStateError::ServiceClosed`] if the service shuts down
    /// before applying it.
    async fn submit_state_update(
        &self,
        source: &str,
        task: StateUpdateTask,
    ) -> ClusterStateResult<Arc<ClusterState>>;
}
