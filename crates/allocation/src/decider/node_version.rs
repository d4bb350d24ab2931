use keystone_cluster_state::ShardRouting;
use keystone_topology::Node;

use super::AllocationDecider;
use crate::decision::Decision;
use crate::routing_allocation::RoutingAllocation;

const NAME: &str = "node_version";

/// Never copies shard data from a newer node to an older one
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeVersionAllocationDecider;

impl AllocationDecider for NodeVersionAllocationDecider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_allocate(
        &self,
        shard: &ShardRouting,
        node: &Node,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        let source_node_id = if shard.primary() {
            // only a relocating primary copies from another node
            shard.current_node()
        } else {
            allocation
                .routing()
                .active_primary(shard.shard_id())
                .and_then(ShardRouting::current_node)
        };
        let Some(source) = source_node_id.and_then(|id| allocation.nodes().get(id.as_str())) else {
            return Decision::yes(NAME, "no active source copy to recover from");
        };
        if node.version() >= source.version() {
            Decision::yes(
                NAME,
                format!(
                    "can recover from node version [{}] to node version [{}]",
                    source.version(),
                    node.version()
                ),
            )
        } else {
            Decision::no(
                NAME,
                format!(
                    "cannot recover a {} shard to a node with version [{}] since this is older than the source node version [{}]",
                    if shard.primary() { "primary" } else { "replica" },
                    node.version(),
                    source.version()
                ),
            )
        }
    }
}
