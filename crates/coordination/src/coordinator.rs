//! Adding and clearing voting config exclusions
//!
//! Both operations commit one state-update task through the cluster service
//! and then wait on a [`ClusterStateObserver`] for the change to take effect.

use std::collections::BTreeSet;
use std::sync::Arc;

use keystone_cluster_state::settings::MAX_VOTING_CONFIG_EXCLUSIONS;
use keystone_cluster_state::{
    ClusterService, ClusterState, ClusterStateError, ClusterStateObserver, ClusterStateResult,
    ObservedState, VotingConfigExclusion, VotingConfiguration, format_exclusions,
};
use keystone_topology::NodeId;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::error::{CoordinationError, CoordinationResult};
use crate::request::{
    AddVotingConfigExclusionsRequest, ClearVotingConfigExclusionsRequest, CoordinationRequest,
};

/// Adds and clears voting config exclusions on top of a cluster service
pub struct VotingExclusionsCoordinator<S: ClusterService + ?Sized> {
    service: Arc<S>,
}

impl<S: ClusterService + ?Sized> Clone for VotingExclusionsCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

impl<S: ClusterService + ?Sized> VotingExclusionsCoordinator<S> {
    /// Create a coordinator
    pub const fn new(service: Arc<S>) -> Self {
        Self { service }
    }

    /// The cluster service in use
    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// Withdraw the requested nodes from the voting configuration.
    ///
    /// Returns once none of the excluded node ids is part of the committed
    /// configuration. Re-adding exclusions that already exist returns
    /// immediately without touching the state.
    ///
    /// # Errors
    ///
    /// - [`CoordinationError::Validation`] for a malformed request or
    ///   descriptors matching no master-eligible node
    /// - [`CoordinationError::CapacityExceeded`] if the exclusions would
    ///   exceed `cluster.max_voting_config_exclusions`
    /// - [`CoordinationError::Timeout`] if the committed configuration still
    ///   contains an excluded node when the timeout expires
    /// - [`CoordinationError::ServiceUnavailable`] if the service shuts down
    ///   while waiting
    /// - [`CoordinationError::StateUpdate`] if the task fails
    pub async fn add_exclusions(
        &self,
        request: AddVotingConfigExclusionsRequest,
    ) -> CoordinationResult<()> {
        request.validate()?;
        request.warn_if_deprecated();

        let state = self.service.state();
        let resolved = request.resolve(&state)?;
        let current = state.coordination().voting_config_exclusions();
        if resolved.is_subset(current) {
            debug!(
                "Voting config exclusions {} already in place",
                format_exclusions(&resolved)
            );
            return Ok(());
        }
        check_capacity(
            &request,
            &resolved,
            current,
            self.service.settings().max_voting_config_exclusions(),
        )
        .map_err(CoordinationError::CapacityExceeded)?;

        let source = AddVotingConfigExclusionsRequest::request_type();
        let settings = self.service.settings().clone();
        let task_request = request.clone();
        let (record_applied, applied_exclusions) = oneshot::channel();
        let applied = self
            .service
            .submit_state_update(
                source,
                Box::new(move |current: &ClusterState| -> ClusterStateResult<ClusterState> {
                    let resolved = task_request
                        .resolve(current)
                        .map_err(|e| ClusterStateError::task_failed(source, e.to_string()))?;
                    let existing = current.coordination().voting_config_exclusions();
                    check_capacity(
                        &task_request,
                        &resolved,
                        existing,
                        settings.max_voting_config_exclusions(),
                    )
                    .map_err(|reason| ClusterStateError::task_failed(source, reason))?;

                    let exclusions: BTreeSet<VotingConfigExclusion> =
                        existing.union(&resolved).cloned().collect();
                    let coordination = current
                        .coordination()
                        .to_builder()
                        .last_accepted_configuration(VotingConfiguration::from_live_nodes(
                            current.nodes(),
                            &exclusions,
                        ))
                        .voting_config_exclusions(exclusions)
                        .build();
                    let _ = record_applied.send(resolved);
                    Ok(current.to_builder().coordination(coordination).build())
                }),
            )
            .await?;
        // the task re-resolved against the state it was applied to
        let resolved = applied_exclusions.await.unwrap_or(resolved);
        info!(
            "Added voting config exclusions {} at version {}",
            format_exclusions(&resolved),
            applied.version()
        );

        let excluded_ids: Vec<NodeId> = resolved
            .iter()
            .filter_map(VotingConfigExclusion::node_id)
            .cloned()
            .collect();
        let observer = ClusterStateObserver::new(&*self.service, Some(request.timeout));
        let outcome = observer
            .wait_for(move |state| {
                let committed = state.coordination().last_committed_configuration();
                excluded_ids.iter().all(|id| !committed.contains(id.as_str()))
            })
            .await;

        match outcome {
            ObservedState::Matched(state) => {
                debug!(
                    "Voting config exclusions took effect at version {}",
                    state.version()
                );
                Ok(())
            }
            ObservedState::TimedOut(last) => {
                let committed = last.coordination().last_committed_configuration();
                let pending = resolved.iter().filter(|exclusion| {
                    exclusion
                        .node_id()
                        .is_some_and(|id| committed.contains(id.as_str()))
                });
                Err(CoordinationError::Timeout(format!(
                    "timed out waiting for voting config exclusions {} to take effect",
                    format_exclusions(pending)
                )))
            }
            ObservedState::Closed => Err(CoordinationError::ServiceUnavailable(format!(
                "voting config exclusions {} to take effect",
                format_exclusions(&resolved)
            ))),
        }
    }

    /// Remove every voting config exclusion and restore all live
    /// master-eligible nodes to the voting configuration.
    ///
    /// With `wait_for_removal` the excluded nodes must first leave the
    /// cluster; if they don't within the timeout nothing is cleared.
    ///
    /// # Errors
    ///
    /// - [`CoordinationError::Timeout`] if excluded nodes are still present
    ///   when the timeout expires
    /// - [`CoordinationError::ServiceUnavailable`] if the service shuts down
    ///   while waiting
    /// - [`CoordinationError::StateUpdate`] if the task fails
    pub async fn clear_exclusions(
        &self,
        request: ClearVotingConfigExclusionsRequest,
    ) -> CoordinationResult<()> {
        let exclusions = self
            .service
            .state()
            .coordination()
            .voting_config_exclusions()
            .clone();
        if exclusions.is_empty() {
            debug!("No voting config exclusions to clear");
            return Ok(());
        }

        if request.wait_for_removal {
            let pending = exclusions.clone();
            let observer = ClusterStateObserver::new(&*self.service, Some(request.timeout));
            let outcome = observer
                .wait_for(move |state| {
                    pending
                        .iter()
                        .all(|exclusion| !exclusion.is_present_in(state.nodes()))
                })
                .await;
            match outcome {
                ObservedState::Matched(_) => {}
                ObservedState::TimedOut(last) => {
                    let present = exclusions
                        .iter()
                        .filter(|exclusion| exclusion.is_present_in(last.nodes()));
                    return Err(CoordinationError::Timeout(format!(
                        "timed out waiting for removal of nodes; if nodes should not be removed, set waitForRemoval to false. {}",
                        format_exclusions(present)
                    )));
                }
                ObservedState::Closed => {
                    return Err(CoordinationError::ServiceUnavailable(format!(
                        "removal of nodes {}",
                        format_exclusions(&exclusions)
                    )));
                }
            }
        }

        let applied = self
            .service
            .submit_state_update(
                ClearVotingConfigExclusionsRequest::request_type(),
                Box::new(|current: &ClusterState| -> ClusterStateResult<ClusterState> {
                    let coordination = current
                        .coordination()
                        .to_builder()
                        .clear_voting_config_exclusions()
                        .last_accepted_configuration(VotingConfiguration::from_live_nodes(
                            current.nodes(),
                            std::iter::empty(),
                        ))
                        .build();
                    Ok(current.to_builder().coordination(coordination).build())
                }),
            )
            .await?;
        info!(
            "Cleared voting config exclusions {} at version {}",
            format_exclusions(&exclusions),
            applied.version()
        );
        Ok(())
    }
}

/// Reject additions that would push the exclusion count over `max`
fn check_capacity(
    request: &AddVotingConfigExclusionsRequest,
    resolved: &BTreeSet<VotingConfigExclusion>,
    existing: &BTreeSet<VotingConfigExclusion>,
    max: usize,
) -> Result<(), String> {
    let total = existing.union(resolved).count();
    if total > max {
        return Err(format!(
            "add voting config exclusions request for {} would add [{}] exclusions to the existing [{}] which would exceed the maximum of [{}] set by [{}]",
            request,
            total - existing.len(),
            existing.len(),
            max,
            MAX_VOTING_CONFIG_EXCLUSIONS
        ));
    }
    Ok(())
}
