use keystone_cluster_state::ShardRouting;
use keystone_topology::Node;

use super::AllocationDecider;
use crate::decision::Decision;
use crate::routing_allocation::RoutingAllocation;

const NAME: &str = "snapshot_in_progress";

/// Keeps a shard in place while a snapshot is reading it
#[derive(Debug, Default, Clone, Copy)]
pub struct SnapshotInProgressAllocationDecider;

impl AllocationDecider for SnapshotInProgressAllocationDecider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_allocate(
        &self,
        shard: &ShardRouting,
        _node: &Node,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        let Some(current) = shard.current_node() else {
            return Decision::yes(NAME, "the shard is not being moved");
        };
        match allocation
            .snapshots_in_progress()
            .snapshotting(shard.shard_id(), current.as_str())
        {
            Some(snapshot) => Decision::throttle(
                NAME,
                format!(
                    "waiting for snapshot [{snapshot}] of shard {} to complete on node [{current}]",
                    shard.shard_id()
                ),
            ),
            None => Decision::yes(NAME, "the shard is not being snapshotted"),
        }
    }
}
