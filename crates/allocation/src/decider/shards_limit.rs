use keystone_cluster_state::ShardRouting;
use keystone_topology::Node;

use super::AllocationDecider;
use crate::decision::Decision;
use crate::routing_allocation::RoutingAllocation;

const NAME: &str = "shards_limit";

/// Caps the number of shards per node, per index and cluster-wide
#[derive(Debug, Default, Clone, Copy)]
pub struct ShardsLimitAllocationDecider;

impl ShardsLimitAllocationDecider {
    /// `allocating` counts the shard being placed on top of the node's
    /// current shards.
    fn check(
        shard: &ShardRouting,
        node: &Node,
        allocation: &RoutingAllocation<'_>,
        allocating: bool,
    ) -> Decision {
        let node_id = node.id().as_str();
        let index_name = shard.shard_id().index();
        let over = |count: usize, limit: u32| {
            let limit = limit as usize;
            if allocating { count >= limit } else { count > limit }
        };

        let index_limit = allocation
            .index(index_name)
            .and_then(|index| index.settings().total_shards_per_node);
        if let Some(limit) = index_limit {
            let count = allocation
                .routing()
                .shards_on_node_including_incoming(node_id)
                .filter(|s| s.shard_id().index() == index_name)
                .count();
            if over(count, limit) {
                return Decision::no(
                    NAME,
                    format!(
                        "too many shards [{count}] allocated to this node for index [{index_name}], index setting [index.routing.allocation.total_shards_per_node={limit}]"
                    ),
                );
            }
        }

        if let Some(limit) = allocation.settings().total_shards_per_node {
            let count = allocation
                .routing()
                .shards_on_node_including_incoming(node_id)
                .count();
            if over(count, limit) {
                return Decision::no(
                    NAME,
                    format!(
                        "too many shards [{count}] allocated to this node, cluster setting [cluster.routing.allocation.total_shards_per_node={limit}]"
                    ),
                );
            }
        }
        Decision::yes(NAME, "the shard count is under the index and cluster limits")
    }
}

impl AllocationDecider for ShardsLimitAllocationDecider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_allocate(
        &self,
        shard: &ShardRouting,
        node: &Node,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        Self::check(shard, node, allocation, true)
    }

    fn can_remain(
        &self,
        shard: &ShardRouting,
        node: &Node,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        Self::check(shard, node, allocation, false)
    }
}
