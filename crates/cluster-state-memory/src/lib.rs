//! In-memory (single process) cluster service for tests and local development.
//!
//! Tasks are applied by a single worker task in submission order. After every
//! applied task the configured reconcilers run, the version is bumped and the
//! accepted voting configuration is copied to the committed one (unless
//! commits are stalled), then the new state is broadcast.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use keystone_cluster_state::{
    ClusterService, ClusterSettings, ClusterState, ClusterStateError, ClusterStateResult,
    CoordinationMetadata, StateReconciler, StateUpdateTask, VotingConfiguration,
};
use keystone_topology::{Node, Nodes};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

struct Submission {
    source: String,
    task: StateUpdateTask,
    reply: oneshot::Sender<ClusterStateResult<Arc<ClusterState>>>,
}

struct Shared {
    publisher: Mutex<Option<watch::Sender<Arc<ClusterState>>>>,
    states: watch::Receiver<Arc<ClusterState>>,
    settings: ClusterSettings,
    stall_commits: AtomicBool,
    reconcilers: Vec<Arc<dyn StateReconciler>>,
}

/// In-memory cluster service.
#[derive(Clone)]
pub struct MemoryClusterService {
    shared: Arc<Shared>,
    tasks: mpsc::UnboundedSender<Submission>,
}

impl MemoryClusterService {
    /// Start building a service.
    #[must_use]
    pub fn builder() -> MemoryClusterServiceBuilder {
        MemoryClusterServiceBuilder::default()
    }

    /// Stop or resume committing accepted voting configurations.
    ///
    /// While stalled, applied tasks still publish new states but the committed
    /// configuration stays where it was. Resuming takes effect on the next
    /// applied task.
    pub fn stall_commits(&self, stalled: bool) {
        self.shared.stall_commits.store(stalled, Ordering::SeqCst);
    }

    /// Number of live subscriptions, not counting the service's own.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.shared
            .publisher
            .lock()
            .as_ref()
            .map_or(0, |publisher| publisher.receiver_count().saturating_sub(1))
    }

    /// Whether [`MemoryClusterService::shutdown`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.publisher.lock().is_none()
    }

    /// Shut the service down.
    ///
    /// Subscribers observe the close; queued and future tasks fail with
    /// [`ClusterStateError::ServiceClosed`].
    pub fn shutdown(&self) {
        if self.shared.publisher.lock().take().is_some() {
            info!("Memory cluster service shut down");
        }
    }

    /// Add a node to the directory.
    ///
    /// A master-eligible node that is not excluded joins the accepted voting
    /// configuration.
    ///
    /// # Errors
    ///
    /// Fails if the service is closed.
    pub async fn add_node(&self, node: Node) -> ClusterStateResult<Arc<ClusterState>> {
        self.submit_state_update(
            "node-join",
            Box::new(move |state: &ClusterState| {
                let coordination = state.coordination();
                let excluded = coordination
                    .voting_config_exclusions()
                    .iter()
                    .any(|exclusion| exclusion.matches(&node));
                let mut accepted = coordination.last_accepted_configuration().clone();
                if node.is_master_eligible() && !excluded {
                    accepted = VotingConfiguration::new(
                        accepted
                            .node_ids()
                            .iter()
                            .cloned()
                            .chain(std::iter::once(node.id().clone())),
                    );
                }
                let coordination = coordination
                    .to_builder()
                    .last_accepted_configuration(accepted)
                    .build();
                Ok(state
                    .to_builder()
                    .nodes(state.nodes().with_node(node))
                    .coordination(coordination)
                    .build())
            }),
        )
        .await
    }

    /// Remove a node from the directory and from the accepted voting
    /// configuration.
    ///
    /// # Errors
    ///
    /// Fails if the node is unknown or the service is closed.
    pub async fn remove_node(&self, node_id: &str) -> ClusterStateResult<Arc<ClusterState>> {
        let node_id = node_id.to_string();
        self.submit_state_update(
            "node-left",
            Box::new(move |state: &ClusterState| {
                let Some(node) = state.nodes().get(&node_id) else {
                    return Err(ClusterStateError::task_failed(
                        "node-left",
                        format!("unknown node [{node_id}]"),
                    ));
                };
                let coordination = state.coordination();
                let accepted = coordination
                    .last_accepted_configuration()
                    .without([node.id()]);
                let coordination = coordination
                    .to_builder()
                    .last_accepted_configuration(accepted)
                    .build();
                Ok(state
                    .to_builder()
                    .nodes(state.nodes().without_node(&node_id))
                    .coordination(coordination)
                    .build())
            }),
        )
        .await
    }

    async fn run_worker(shared: Arc<Shared>, mut tasks: mpsc::UnboundedReceiver<Submission>) {
        while let Some(Submission {
            source,
            task,
            reply,
        }) = tasks.recv().await
        {
            let result = Self::apply(&shared, &source, task);
            let _ = reply.send(result);
        }
        debug!("Memory cluster service worker stopped");
    }

    fn apply(
        shared: &Shared,
        source: &str,
        task: StateUpdateTask,
    ) -> ClusterStateResult<Arc<ClusterState>> {
        if shared.publisher.lock().is_none() {
            return Err(ClusterStateError::ServiceClosed);
        }

        let current = shared.states.borrow().clone();
        debug!(
            "Applying cluster state update task [{}] to version {}",
            source,
            current.version()
        );
        let next = task(&current).inspect_err(|e| {
            warn!("Cluster state update task [{}] failed: {}", source, e);
        })?;
        let next = shared
            .reconcilers
            .iter()
            .fold(next, |state, reconciler| reconciler.reconcile(state));

        let coordination = next.coordination();
        let committed = if shared.stall_commits.load(Ordering::SeqCst) {
            current.coordination().last_committed_configuration().clone()
        } else {
            coordination.last_accepted_configuration().clone()
        };
        let coordination = coordination
            .to_builder()
            .last_committed_configuration(committed)
            .build();
        let next = Arc::new(
            next.to_builder()
                .version(current.version() + 1)
                .coordination(coordination)
                .build(),
        );

        let guard = shared.publisher.lock();
        let Some(publisher) = guard.as_ref() else {
            return Err(ClusterStateError::ServiceClosed);
        };
        publisher.send_replace(next.clone());
        debug!(
            "Published cluster state version {} from task [{}]",
            next.version(),
            source
        );
        Ok(next)
    }
}

#[async_trait]
impl ClusterService for MemoryClusterService {
    fn state(&self) -> Arc<ClusterState> {
        self.shared.states.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Arc<ClusterState>> {
        self.shared
            .publisher
            .lock()
            .as_ref()
            .map_or_else(|| self.shared.states.clone(), watch::Sender::subscribe)
    }

    fn settings(&self) -> &ClusterSettings {
        &self.shared.settings
    }

    async fn submit_state_update(
        &self,
        source: &str,
        task: StateUpdateTask,
    ) -> ClusterStateResult<Arc<ClusterState>> {
        if self.is_closed() {
            return Err(ClusterStateError::ServiceClosed);
        }
        let (reply, response) = oneshot::channel();
        self.tasks
            .send(Submission {
                source: source.to_string(),
                task,
                reply,
            })
            .map_err(|_| ClusterStateError::ServiceClosed)?;
        response
            .await
            .map_err(|_| ClusterStateError::ServiceClosed)?
    }
}

/// Builder for [`MemoryClusterService`].
#[derive(Default)]
pub struct MemoryClusterServiceBuilder {
    state: Option<ClusterState>,
    settings: Option<ClusterSettings>,
    reconcilers: Vec<Arc<dyn StateReconciler>>,
}

impl MemoryClusterServiceBuilder {
    /// Start from an explicit state.
    #[must_use]
    pub fn state(mut self, state: ClusterState) -> Self {
        self.state = Some(state);
        self
    }

    /// Start from a bootstrapped cluster of `nodes`: every master-eligible
    /// node is in both the accepted and committed voting configuration.
    #[must_use]
    pub fn nodes(mut self, nodes: Nodes) -> Self {
        let config = VotingConfiguration::of(nodes.master_eligible_nodes());
        let coordination = CoordinationMetadata::builder()
            .term(1)
            .last_accepted_configuration(config.clone())
            .last_committed_configuration(config)
            .build();
        self.state = Some(
            ClusterState::builder()
                .nodes(nodes)
                .coordination(coordination)
                .build(),
        );
        self
    }

    /// Share a settings handle with the service.
    #[must_use]
    pub fn settings(mut self, settings: ClusterSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Run `reconciler` after every applied task.
    #[must_use]
    pub fn reconciler(mut self, reconciler: Arc<dyn StateReconciler>) -> Self {
        self.reconcilers.push(reconciler);
        self
    }

    /// Build the service and start its worker.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn build(self) -> MemoryClusterService {
        let (publisher, states) = watch::channel(Arc::new(self.state.unwrap_or_default()));
        let shared = Arc::new(Shared {
            publisher: Mutex::new(Some(publisher)),
            states,
            settings: self.settings.unwrap_or_default(),
            stall_commits: AtomicBool::new(false),
            reconcilers: self.reconcilers,
        });
        let (tasks, receiver) = mpsc::unbounded_channel();
        tokio::spawn(MemoryClusterService::run_worker(shared.clone(), receiver));
        MemoryClusterService { shared, tasks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use keystone_topology::NodeRole;

    fn nodes() -> Nodes {
        Nodes::builder()
            .add(Node::builder("a", "node-a").role(NodeRole::Master).build())
            .add(Node::builder("b", "node-b").role(NodeRole::Master).build())
            .add(Node::builder("d", "data-1").role(NodeRole::Data).build())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_bootstrap_voting_configuration() {
        let service = MemoryClusterService::builder().nodes(nodes()).build();
        let state = service.state();
        let committed = state.coordination().last_committed_configuration();
        assert_eq!(committed.len(), 2);
        assert!(!committed.contains("d"));
    }

    #[tokio::test]
    async fn test_tasks_bump_version_and_commit() {
        let service = MemoryClusterService::builder().nodes(nodes()).build();
        let before = service.state().version();

        let state = service
            .add_node(Node::builder("c", "node-c").role(NodeRole::Master).build())
            .await
            .unwrap();

        assert_eq!(state.version(), before + 1);
        assert!(state.coordination().last_committed_configuration().contains("c"));
        assert_eq!(service.state().version(), state.version());
    }

    #[tokio::test]
    async fn test_stalled_commits_keep_committed_configuration() {
        let service = MemoryClusterService::builder().nodes(nodes()).build();
        service.stall_commits(true);

        let state = service.remove_node("b").await.unwrap();
        let coordination = state.coordination();
        assert!(!coordination.last_accepted_configuration().contains("b"));
        assert!(coordination.last_committed_configuration().contains("b"));

        service.stall_commits(false);
        let state = service
            .submit_state_update("noop", Box::new(|state: &ClusterState| Ok(state.clone())))
            .await
            .unwrap();
        assert!(!state.coordination().last_committed_configuration().contains("b"));
    }

    #[tokio::test]
    async fn test_failed_task_leaves_state_untouched() {
        let service = MemoryClusterService::builder().nodes(nodes()).build();
        let before = service.state();

        let result = service.remove_node("zzz").await;

        assert_matches!(
            result,
            Err(ClusterStateError::TaskFailed { task, .. }) if task == "node-left"
        );
        assert_eq!(service.state().version(), before.version());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_tasks() {
        let service = MemoryClusterService::builder().nodes(nodes()).build();
        service.shutdown();

        assert!(service.is_closed());
        assert_matches!(
            service.remove_node("a").await,
            Err(ClusterStateError::ServiceClosed)
        );
    }
}
