use keystone_cluster_state::ShardRouting;

use super::AllocationDecider;
use crate::decision::Decision;
use crate::routing_allocation::RoutingAllocation;

const NAME: &str = "concurrent_rebalance";

/// Limits the number of relocations running at once
#[derive(Debug, Default, Clone, Copy)]
pub struct ConcurrentRebalanceAllocationDecider;

impl AllocationDecider for ConcurrentRebalanceAllocationDecider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_rebalance_shard(
        &self,
        _shard: &ShardRouting,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        let limit = allocation.settings().cluster_concurrent_rebalance;
        let Ok(limit) = usize::try_from(limit) else {
            return Decision::yes(NAME, "unlimited concurrent rebalances are allowed");
        };
        let relocating = allocation.routing().relocating_count();
        if relocating >= limit {
            return Decision::throttle(
                NAME,
                format!(
                    "reached the limit of concurrently rebalancing shards [{relocating}], cluster setting [cluster.routing.allocation.cluster_concurrent_rebalance={limit}]"
                ),
            );
        }
        Decision::yes(
            NAME,
            format!(
                "below threshold [{limit}] for concurrent rebalances, current rebalance shard count [{relocating}]"
            ),
        )
    }
}
