//! Allocation deciders
//!
//! A decider answers whether a shard copy may be allocated to, remain on, or
//! be rebalanced away from a node. Deciders are consulted in a fixed order;
//! the first NO wins, otherwise any THROTTLE wins, otherwise the answer is YES.

mod awareness;
mod cluster_rebalance;
mod concurrent_rebalance;
mod disk_threshold;
mod enable;
mod filter;
mod max_retry;
mod node_version;
mod rebalance_only_when_active;
mod replica_after_primary_active;
mod resize;
mod restore_in_progress;
mod same_shard;
mod shards_limit;
mod snapshot_in_progress;
mod throttling;

#[cfg(test)]
pub(crate) mod test_support;

use std::any::{TypeId, type_name};
use std::collections::HashSet;

use keystone_cluster_state::ShardRouting;
use keystone_topology::Node;
use tracing::debug;

use crate::decision::{Decision, Outcome};
use crate::error::{AllocationError, AllocationResult};
use crate::routing_allocation::RoutingAllocation;

pub use awareness::AwarenessAllocationDecider;
pub use cluster_rebalance::ClusterRebalanceAllocationDecider;
pub use concurrent_rebalance::ConcurrentRebalanceAllocationDecider;
pub use disk_threshold::DiskThresholdDecider;
pub use enable::EnableAllocationDecider;
pub use filter::FilterAllocationDecider;
pub use max_retry::MaxRetryAllocationDecider;
pub use node_version::NodeVersionAllocationDecider;
pub use rebalance_only_when_active::RebalanceOnlyWhenActiveAllocationDecider;
pub use replica_after_primary_active::ReplicaAfterPrimaryActiveAllocationDecider;
pub use resize::ResizeAllocationDecider;
pub use restore_in_progress::RestoreInProgressAllocationDecider;
pub use same_shard::SameShardAllocationDecider;
pub use shards_limit::ShardsLimitAllocationDecider;
pub use snapshot_in_progress::SnapshotInProgressAllocationDecider;
pub use throttling::ThrottlingAllocationDecider;

/// A single allocation rule.
///
/// Every question defaults to YES so deciders only implement what they
/// restrict.
pub trait AllocationDecider: Send + Sync + 'static {
    /// Label attached to this decider's decisions
    fn name(&self) -> &'static str;

    /// May `shard` be allocated to `node`?
    fn can_allocate(
        &self,
        _shard: &ShardRouting,
        _node: &Node,
        _allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        Decision::YES
    }

    /// May `shard` stay on `node`, where it is currently allocated?
    fn can_remain(
        &self,
        _shard: &ShardRouting,
        _node: &Node,
        _allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        Decision::YES
    }

    /// May `shard` be moved for balance?
    fn can_rebalance_shard(
        &self,
        _shard: &ShardRouting,
        _allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        Decision::YES
    }

    /// May the cluster rebalance at all?
    fn can_rebalance(&self, _allocation: &RoutingAllocation<'_>) -> Decision {
        Decision::YES
    }
}

/// The ordered decider chain
pub struct AllocationDeciders {
    deciders: Vec<Box<dyn AllocationDecider>>,
}

impl AllocationDeciders {
    /// Chain `deciders` in the given order
    #[must_use]
    pub fn new(deciders: Vec<Box<dyn AllocationDecider>>) -> Self {
        Self { deciders }
    }

    /// Decider names in evaluation order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.deciders.iter().map(|decider| decider.name())
    }

    /// Ask every decider whether `shard` may be allocated to `node`
    #[must_use]
    pub fn can_allocate(
        &self,
        shard: &ShardRouting,
        node: &Node,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        self.combine(allocation, |decider| {
            decider.can_allocate(shard, node, allocation)
        })
    }

    /// Ask every decider whether `shard` may stay on `node`
    #[must_use]
    pub fn can_remain(
        &self,
        shard: &ShardRouting,
        node: &Node,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        self.combine(allocation, |decider| decider.can_remain(shard, node, allocation))
    }

    /// Ask every decider whether `shard` may be moved for balance
    #[must_use]
    pub fn can_rebalance_shard(
        &self,
        shard: &ShardRouting,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        self.combine(allocation, |decider| {
            decider.can_rebalance_shard(shard, allocation)
        })
    }

    /// Ask every decider whether the cluster may rebalance
    #[must_use]
    pub fn can_rebalance(&self, allocation: &RoutingAllocation<'_>) -> Decision {
        self.combine(allocation, |decider| decider.can_rebalance(allocation))
    }

    fn combine<F>(&self, allocation: &RoutingAllocation<'_>, mut ask: F) -> Decision
    where
        F: FnMut(&dyn AllocationDecider) -> Decision,
    {
        if allocation.debug_decisions() {
            return Decision::Multi(
                self.deciders
                    .iter()
                    .map(|decider| ask(decider.as_ref()))
                    .collect(),
            );
        }

        let mut throttled = None;
        for decider in &self.deciders {
            let decision = ask(decider.as_ref());
            match decision.outcome() {
                Outcome::No => {
                    debug!("Decider [{}] said NO: {}", decider.name(), decision);
                    return decision;
                }
                Outcome::Throttle => {
                    throttled.get_or_insert(decision);
                }
                Outcome::Yes => {}
            }
        }
        throttled.unwrap_or(Decision::YES)
    }
}

impl std::fmt::Debug for AllocationDeciders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Collects deciders and builds the chain.
///
/// Deciders are keyed by implementation type: registering the same type twice
/// fails at [`DeciderRegistry::build`].
#[derive(Default)]
pub struct DeciderRegistry {
    deciders: Vec<(TypeId, &'static str, Box<dyn AllocationDecider>)>,
}

impl DeciderRegistry {
    /// An empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in deciders in their fixed order
    #[must_use]
    pub fn with_builtins() -> Self {
        Self::new()
            .register(MaxRetryAllocationDecider)
            .register(ResizeAllocationDecider)
            .register(ReplicaAfterPrimaryActiveAllocationDecider)
            .register(RebalanceOnlyWhenActiveAllocationDecider)
            .register(ClusterRebalanceAllocationDecider)
            .register(ConcurrentRebalanceAllocationDecider)
            .register(EnableAllocationDecider)
            .register(NodeVersionAllocationDecider)
            .register(SnapshotInProgressAllocationDecider)
            .register(RestoreInProgressAllocationDecider)
            .register(FilterAllocationDecider)
            .register(SameShardAllocationDecider)
            .register(DiskThresholdDecider)
            .register(ThrottlingAllocationDecider)
            .register(ShardsLimitAllocationDecider)
            .register(AwarenessAllocationDecider)
    }

    /// Append a decider after those already registered
    #[must_use]
    pub fn register<D: AllocationDecider>(mut self, decider: D) -> Self {
        self.deciders
            .push((TypeId::of::<D>(), type_name::<D>(), Box::new(decider)));
        self
    }

    /// Build the chain
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::DuplicateDecider`] if a decider type was
    /// registered more than once.
    pub fn build(self) -> AllocationResult<AllocationDeciders> {
        let mut seen = HashSet::new();
        for (type_id, type_name, _) in &self.deciders {
            if !seen.insert(*type_id) {
                return Err(AllocationError::DuplicateDecider(*type_name));
            }
        }
        Ok(AllocationDeciders::new(
            self.deciders
                .into_iter()
                .map(|(_, _, decider)| decider)
                .collect(),
        ))
    }
}

/// Explanation for an index or cluster level setting lookup
pub(crate) fn setting_source(index_level: bool) -> &'static str {
    if index_level { "index setting" } else { "cluster setting" }
}
