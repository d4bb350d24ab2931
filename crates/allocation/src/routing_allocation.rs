//! Context of a single reroute

use keystone_cluster_state::{
    AllocationSettings, ClusterState, IndexMetadata, RestoreInProgress, RoutingTable, ShardRouting,
    SnapshotsInProgress,
};
use keystone_topology::Nodes;

use crate::cluster_info::ClusterInfo;

/// Everything deciders and allocators may look at during a reroute.
///
/// The routing table is a working copy that the allocator updates as it
/// places shards; the rest is a read-only view of the state being rerouted.
#[derive(Debug)]
pub struct RoutingAllocation<'a> {
    state: &'a ClusterState,
    settings: &'a AllocationSettings,
    cluster_info: &'a ClusterInfo,
    routing: RoutingTable,
    debug_decisions: bool,
    changed: bool,
}

impl<'a> RoutingAllocation<'a> {
    /// Create a context for rerouting `state`
    #[must_use]
    pub fn new(
        state: &'a ClusterState,
        settings: &'a AllocationSettings,
        cluster_info: &'a ClusterInfo,
    ) -> Self {
        Self {
            state,
            settings,
            cluster_info,
            routing: state.routing_table().clone(),
            debug_decisions: false,
            changed: false,
        }
    }

    /// Collect every decider's verdict instead of stopping at the first NO
    #[must_use]
    pub const fn with_debug_decisions(mut self, debug: bool) -> Self {
        self.debug_decisions = debug;
        self
    }

    /// Whether every decider's verdict is collected
    #[must_use]
    pub const fn debug_decisions(&self) -> bool {
        self.debug_decisions
    }

    /// Node directory
    #[must_use]
    pub const fn nodes(&self) -> &'a Nodes {
        self.state.nodes()
    }

    /// Metadata of an index
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&'a IndexMetadata> {
        self.state.metadata().index(name)
    }

    /// Allocation settings in effect for this reroute
    #[must_use]
    pub const fn settings(&self) -> &'a AllocationSettings {
        self.settings
    }

    /// Disk usage and shard sizes
    #[must_use]
    pub const fn cluster_info(&self) -> &'a ClusterInfo {
        self.cluster_info
    }

    /// Running snapshots
    #[must_use]
    pub const fn snapshots_in_progress(&self) -> &'a SnapshotsInProgress {
        self.state.snapshots_in_progress()
    }

    /// Running restores
    #[must_use]
    pub const fn restore_in_progress(&self) -> &'a RestoreInProgress {
        self.state.restore_in_progress()
    }

    /// Current working routing table
    #[must_use]
    pub const fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    /// Replace a copy in the working routing table
    pub fn update(&mut self, shard: ShardRouting) {
        if self.routing.update(shard) {
            self.changed = true;
        }
    }

    /// Mutable access to the working routing table
    pub fn routing_mut(&mut self) -> &mut RoutingTable {
        self.changed = true;
        &mut self.routing
    }

    /// Whether the routing table was modified
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.changed
    }

    /// Consume the context, returning the working routing table
    #[must_use]
    pub fn into_routing(self) -> RoutingTable {
        self.routing
    }
}
