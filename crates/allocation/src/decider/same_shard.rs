use keystone_cluster_state::ShardRouting;
use keystone_topology::Node;

use super::AllocationDecider;
use crate::decision::Decision;
use crate::routing_allocation::RoutingAllocation;

const NAME: &str = "same_shard";

/// Keeps copies of one shard on different nodes
#[derive(Debug, Default, Clone, Copy)]
pub struct SameShardAllocationDecider;

impl AllocationDecider for SameShardAllocationDecider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_allocate(
        &self,
        shard: &ShardRouting,
        node: &Node,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        let existing = allocation
            .routing()
            .copies(shard.shard_id())
            .iter()
            .filter(|copy| !copy.is_same_copy(shard))
            .find(|copy| {
                copy.current_node() == Some(node.id()) || copy.relocating_node() == Some(node.id())
            });
        match existing {
            Some(copy) => Decision::no(
                NAME,
                format!("a copy of this shard is already allocated to this node [{copy}]"),
            ),
            None => Decision::yes(NAME, "this node does not hold a copy of this shard"),
        }
    }
}
