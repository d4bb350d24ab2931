//! Allocation service
//!
//! Ties the decider chain, the active shards allocator and cluster info
//! together, and turns shard lifecycle events into new cluster states.

use std::collections::BTreeSet;
use std::sync::Arc;

use keystone_cluster_state::{
    ClusterSettings, ClusterState, RecoverySource, RoutingTable, ShardId, ShardRouting,
    StateReconciler,
};
use keystone_topology::{NodeId, Nodes};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::allocator::AllocatorRegistry;
use crate::cluster_info::{ClusterInfo, ClusterInfoProvider, SharedClusterInfo};
use crate::decider::{AllocationDeciders, DeciderRegistry};
use crate::decision::Decision;
use crate::error::{AllocationError, AllocationResult};
use crate::routing_allocation::RoutingAllocation;

/// A node and the chain's verdict for it
#[derive(Debug, Clone, Serialize)]
pub struct NodeDecision {
    /// The node asked
    pub node_id: NodeId,
    /// Every decider's verdict
    pub decision: Decision,
}

/// Why a shard copy is where it is
#[derive(Debug, Clone, Serialize)]
pub struct AllocationExplanation {
    /// The copy explained
    pub shard: ShardRouting,
    /// Whether the copy may stay on its current node, if assigned
    pub can_remain: Option<Decision>,
    /// Whether the copy may be allocated to each data node
    pub node_decisions: Vec<NodeDecision>,
}

/// Runs reroutes and applies shard lifecycle events
pub struct AllocationService {
    deciders: AllocationDeciders,
    allocators: AllocatorRegistry,
    settings: ClusterSettings,
    cluster_info: Arc<dyn ClusterInfoProvider>,
}

impl AllocationService {
    /// Create a service.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::UnknownAllocator`] if the configured
    /// allocator is not registered.
    pub fn new(
        deciders: AllocationDeciders,
        allocators: AllocatorRegistry,
        settings: ClusterSettings,
        cluster_info: Arc<dyn ClusterInfoProvider>,
    ) -> AllocationResult<Self> {
        allocators.get(&settings.get().allocation.allocator)?;
        info!(
            "Allocation service started with deciders {:?}",
            deciders.names().collect::<Vec<_>>()
        );
        Ok(Self {
            deciders,
            allocators,
            settings,
            cluster_info,
        })
    }

    /// Create a service with the built-in deciders, the default allocators
    /// and empty cluster info.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured allocator is not registered.
    pub fn with_defaults(settings: ClusterSettings) -> AllocationResult<Self> {
        Self::new(
            DeciderRegistry::with_builtins().build()?,
            AllocatorRegistry::with_defaults(),
            settings,
            Arc::new(SharedClusterInfo::default()),
        )
    }

    /// The decider chain
    #[must_use]
    pub const fn deciders(&self) -> &AllocationDeciders {
        &self.deciders
    }

    /// Reconcile shard placement with `state`.
    ///
    /// Copies on departed nodes are unassigned, routing entries are created
    /// for new indices and dropped for deleted ones, then the active allocator
    /// runs.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::UnknownAllocator`] if the configured
    /// allocator is not registered.
    pub fn reroute(&self, state: &ClusterState, reason: &str) -> AllocationResult<ClusterState> {
        let settings = self.settings.get();
        let allocator = self.allocators.get(&settings.allocation.allocator)?;
        let cluster_info = self.cluster_info.cluster_info();

        let (routing, metadata_changed) = sync_routing(state);
        let synced;
        let state = if metadata_changed {
            synced = state.to_builder().routing_table(routing).build();
            &synced
        } else {
            state
        };

        let mut allocation = RoutingAllocation::new(state, &settings.allocation, &cluster_info);
        allocator.allocate(&mut allocation, &self.deciders);

        if !allocation.changed() && !metadata_changed {
            debug!("Reroute [{}] left the routing table unchanged", reason);
            return Ok(state.clone());
        }
        debug!("Reroute [{}] updated the routing table", reason);
        let routing = allocation.into_routing();
        Ok(state.to_builder().routing_table(routing).build())
    }

    /// Mark initializing or relocating copies as started, then reroute
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::UnknownShard`] for a copy that is not in
    /// the routing table.
    pub fn apply_started_shards(
        &self,
        state: &ClusterState,
        started: &[ShardRouting],
    ) -> AllocationResult<ClusterState> {
        let mut routing = state.routing_table().clone();
        for shard in started {
            let current = lookup(&routing, shard)?.clone();
            if current.initializing() || current.relocating() {
                debug!("Shard {} started on [{}]", current.shard_id(), node_label(&current));
                routing.update(current.start());
            } else {
                debug!(
                    "Ignoring start of shard {} in state {}",
                    current.shard_id(),
                    current.state()
                );
            }
        }
        let state = state.to_builder().routing_table(routing).build();
        self.reroute(&state, "shards started")
    }

    /// Handle copies that failed, then reroute.
    ///
    /// An initializing copy becomes unassigned with its failure counted. A
    /// failed relocation is cancelled. A failed active primary is replaced by
    /// an active replica when one exists.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::UnknownShard`] for a copy that is not in
    /// the routing table.
    pub fn apply_failed_shards(
        &self,
        state: &ClusterState,
        failed: &[(ShardRouting, String)],
    ) -> AllocationResult<ClusterState> {
        let mut routing = state.routing_table().clone();
        for (shard, message) in failed {
            let current = lookup(&routing, shard)?.clone();
            warn!("Shard {} failed on [{}]: {}", current.shard_id(), node_label(&current), message);
            if current.relocating() {
                routing.update(current.cancel_relocation());
            } else if current.initializing() {
                routing.update(current.fail(message.as_str()));
            } else if current.started() {
                let failed = current.fail(message.as_str());
                if current.primary() {
                    promote_replica(&mut routing, state.nodes(), current.shard_id(), failed);
                } else {
                    routing.update(failed);
                }
            }
        }
        let state = state.to_builder().routing_table(routing).build();
        self.reroute(&state, "shards failed")
    }

    /// Explain the placement of one copy against every data node
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::UnknownShard`] if the copy does not exist.
    pub fn explain(
        &self,
        state: &ClusterState,
        shard_id: &ShardId,
        copy: u32,
    ) -> AllocationResult<AllocationExplanation> {
        let shard = state
            .routing_table()
            .get(shard_id, copy)
            .ok_or_else(|| AllocationError::UnknownShard(format!("{shard_id} copy [{copy}]")))?
            .clone();
        let settings = self.settings.get();
        let cluster_info: ClusterInfo = self.cluster_info.cluster_info();
        let allocation = RoutingAllocation::new(state, &settings.allocation, &cluster_info)
            .with_debug_decisions(true);

        let can_remain = shard
            .current_node()
            .and_then(|id| state.nodes().get(id.as_str()))
            .map(|node| self.deciders.can_remain(&shard, node, &allocation));
        let node_decisions = state
            .nodes()
            .data_nodes()
            .map(|node| NodeDecision {
                node_id: node.id().clone(),
                decision: self.deciders.can_allocate(&shard, node, &allocation),
            })
            .collect();

        Ok(AllocationExplanation {
            shard,
            can_remain,
            node_decisions,
        })
    }
}

impl StateReconciler for AllocationService {
    fn reconcile(&self, state: ClusterState) -> ClusterState {
        match self.reroute(&state, "cluster state update") {
            Ok(state) => state,
            Err(e) => {
                error!("Reroute failed: {}", e);
                state
            }
        }
    }
}

impl std::fmt::Debug for AllocationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocationService")
            .field("deciders", &self.deciders)
            .field("allocators", &self.allocators)
            .finish_non_exhaustive()
    }
}

fn lookup<'r>(
    routing: &'r RoutingTable,
    shard: &ShardRouting,
) -> AllocationResult<&'r ShardRouting> {
    routing
        .get(shard.shard_id(), shard.copy())
        .ok_or_else(|| AllocationError::UnknownShard(shard.to_string()))
}

fn node_label(shard: &ShardRouting) -> &str {
    shard.current_node().map_or("none", NodeId::as_str)
}

/// Replace a failed primary with an active replica on a live node, if any
fn promote_replica(
    routing: &mut RoutingTable,
    nodes: &Nodes,
    shard_id: &ShardId,
    failed_primary: ShardRouting,
) {
    let replica = routing
        .copies(shard_id)
        .iter()
        .find(|copy| {
            !copy.primary()
                && copy.active()
                && copy.current_node().is_some_and(|id| nodes.contains(id.as_str()))
        })
        .cloned();
    match replica {
        Some(replica) => {
            info!("Promoting replica of {} on [{}] to primary", shard_id, node_label(&replica));
            routing.update(replica.promote_to_primary());
            routing.update(failed_primary.demote_to_replica());
        }
        None => {
            routing.update(failed_primary);
        }
    }
}

/// Bring the routing table in line with the index metadata.
///
/// Copies on nodes that left are unassigned and relocations to them are
/// cancelled. Returns whether anything changed.
fn sync_routing(state: &ClusterState) -> (RoutingTable, bool) {
    let nodes = state.nodes();
    let metadata = state.metadata();
    let mut routing = state.routing_table().clone();
    let mut changed = false;

    let routed: BTreeSet<String> = routing
        .shard_ids()
        .map(|shard_id| shard_id.index().to_string())
        .collect();
    for index in &routed {
        if metadata.index(index).is_none() {
            routing.remove_index(index);
            changed = true;
        }
    }
    for index in metadata.indices() {
        if !routed.contains(index.name()) {
            let source = if index.settings().resize_source.is_some() {
                RecoverySource::LocalShards
            } else {
                RecoverySource::EmptyStore
            };
            routing.add_index(index, &source);
            changed = true;
        }
    }

    let departed: Vec<ShardRouting> = routing
        .iter()
        .filter(|shard| {
            shard.current_node().is_some_and(|id| !nodes.contains(id.as_str()))
                || shard.relocating_node().is_some_and(|id| !nodes.contains(id.as_str()))
        })
        .cloned()
        .collect();
    for shard in departed {
        // an earlier iteration may have promoted this copy
        let Some(shard) = routing.get(shard.shard_id(), shard.copy()).cloned() else {
            continue;
        };
        changed = true;
        let gone = shard
            .current_node()
            .is_some_and(|id| !nodes.contains(id.as_str()));
        if !gone {
            routing.update(shard.cancel_relocation());
            continue;
        }
        info!("Node [{}] left, unassigning shard {}", node_label(&shard), shard.shard_id());
        let unassigned = shard.node_left();
        if shard.primary() && shard.active() {
            promote_replica(&mut routing, nodes, shard.shard_id(), unassigned);
        } else {
            routing.update(unassigned);
        }
    }
    (routing, changed)
}
