use keystone_cluster_state::{ShardId, ShardRouting};
use keystone_topology::Node;

use super::AllocationDecider;
use crate::decision::Decision;
use crate::routing_allocation::RoutingAllocation;

const NAME: &str = "resize";

/// Places primaries of a shrunk or split index next to their source shards
#[derive(Debug, Default, Clone, Copy)]
pub struct ResizeAllocationDecider;

impl AllocationDecider for ResizeAllocationDecider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_allocate(
        &self,
        shard: &ShardRouting,
        node: &Node,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        if !shard.primary() || !shard.unassigned() {
            return Decision::YES;
        }
        let Some(index) = allocation.index(shard.shard_id().index()) else {
            return Decision::YES;
        };
        let Some(source_name) = index.settings().resize_source.as_deref() else {
            return Decision::YES;
        };
        let Some(source) = allocation.index(source_name) else {
            return Decision::no(
                NAME,
                format!("resize source index [{source_name}] doesn't exist"),
            );
        };

        for source_shard in index.resize_source_shards(shard.shard_id().id(), source) {
            let source_id = ShardId::new(source_name, source_shard);
            let Some(primary) = allocation.routing().active_primary(&source_id) else {
                return Decision::no(NAME, format!("source primary {source_id} is not active"));
            };
            if primary.current_node() != Some(node.id()) {
                return Decision::no(
                    NAME,
                    format!("source primary {source_id} is allocated on another node"),
                );
            }
        }
        Decision::yes(NAME, "source primaries are active on this node")
    }
}
