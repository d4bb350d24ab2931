//! Immutable cluster state snapshots

use keystone_topology::Nodes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coordination::CoordinationMetadata;
use crate::in_progress::{RestoreInProgress, SnapshotsInProgress};
use crate::metadata::Metadata;
use crate::routing::RoutingTable;

/// One version of the cluster state
///
/// States are never mutated in place. A state-update task derives the next
/// state through [`ClusterState::to_builder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterState {
    version: u64,
    state_uuid: Uuid,
    nodes: Nodes,
    metadata: Metadata,
    routing_table: RoutingTable,
    snapshots_in_progress: SnapshotsInProgress,
    restore_in_progress: RestoreInProgress,
}

impl ClusterState {
    /// Start building a fresh state
    #[must_use]
    pub fn builder() -> ClusterStateBuilder {
        ClusterStateBuilder::default()
    }

    /// Start building the next state from this one
    #[must_use]
    pub fn to_builder(&self) -> ClusterStateBuilder {
        ClusterStateBuilder {
            version: self.version,
            nodes: self.nodes.clone(),
            metadata: self.metadata.clone(),
            routing_table: self.routing_table.clone(),
            snapshots_in_progress: self.snapshots_in_progress.clone(),
            restore_in_progress: self.restore_in_progress.clone(),
        }
    }

    /// Monotonic version, bumped by the cluster service on every update
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Unique id of this state
    #[must_use]
    pub const fn state_uuid(&self) -> Uuid {
        self.state_uuid
    }

    /// Node directory
    #[must_use]
    pub const fn nodes(&self) -> &Nodes {
        &self.nodes
    }

    /// Cluster metadata
    #[must_use]
    pub const fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Shortcut to the voting configuration metadata
    #[must_use]
    pub const fn coordination(&self) -> &CoordinationMetadata {
        self.metadata.coordination()
    }

    /// Shard routing table
    #[must_use]
    pub const fn routing_table(&self) -> &RoutingTable {
        &self.routing_table
    }

    /// Running snapshots
    #[must_use]
    pub const fn snapshots_in_progress(&self) -> &SnapshotsInProgress {
        &self.snapshots_in_progress
    }

    /// Running restores
    #[must_use]
    pub const fn restore_in_progress(&self) -> &RestoreInProgress {
        &self.restore_in_progress
    }
}

impl Default for ClusterState {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ClusterState`]
#[derive(Debug, Default)]
pub struct ClusterStateBuilder {
    version: u64,
    nodes: Nodes,
    metadata: Metadata,
    routing_table: RoutingTable,
    snapshots_in_progress: SnapshotsInProgress,
    restore_in_progress: RestoreInProgress,
}

impl ClusterStateBuilder {
    /// Set the version
    #[must_use]
    pub const fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Bump the version by one
    #[must_use]
    pub const fn increment_version(mut self) -> Self {
        self.version += 1;
        self
    }

    /// Set the node directory
    #[must_use]
    pub fn nodes(mut self, nodes: Nodes) -> Self {
        self.nodes = nodes;
        self
    }

    /// Set the metadata
    #[must_use]
    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Replace only the voting configuration metadata
    #[must_use]
    pub fn coordination(mut self, coordination: CoordinationMetadata) -> Self {
        self.metadata = self.metadata.with_coordination(coordination);
        self
    }

    /// Set the routing table
    #[must_use]
    pub fn routing_table(mut self, routing_table: RoutingTable) -> Self {
        self.routing_table = routing_table;
        self
    }

    /// Set the running snapshots
    #[must_use]
    pub fn snapshots_in_progress(mut self, snapshots: SnapshotsInProgress) -> Self {
        self.snapshots_in_progress = snapshots;
        self
    }

    /// Set the running restores
    #[must_use]
    pub fn restore_in_progress(mut self, restores: RestoreInProgress) -> Self {
        self.restore_in_progress = restores;
        self
    }

    /// Build the state under a fresh uuid
    #[must_use]
    pub fn build(self) -> ClusterState {
        ClusterState {
            version: self.version,
            state_uuid: Uuid::new_v4(),
            nodes: self.nodes,
            metadata: self.metadata,
            routing_table: self.routing_table,
            snapshots_in_progress: self.snapshots_in_progress,
            restore_in_progress: self.restore_in_progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VotingConfiguration;
    use keystone_topology::Node;

    #[test]
    fn test_to_builder_derives_new_state() {
        let nodes = Nodes::builder()
            .add(Node::builder("a", "node-a").build())
            .build()
            .unwrap();
        let state = ClusterState::builder().nodes(nodes).build();

        let coordination = CoordinationMetadata::builder()
            .last_accepted_configuration(VotingConfiguration::of(state.nodes().iter()))
            .build();
        let next = state
            .to_builder()
            .increment_version()
            .coordination(coordination)
            .build();

        assert_eq!(next.version(), state.version() + 1);
        assert_ne!(next.state_uuid(), state.state_uuid());
        assert_eq!(next.nodes(), state.nodes());
        assert!(next.coordination().last_accepted_configuration().contains("a"));
        assert!(state.coordination().last_accepted_configuration().is_empty());
    }
}
