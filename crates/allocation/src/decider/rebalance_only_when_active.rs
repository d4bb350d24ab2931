use keystone_cluster_state::ShardRouting;

use super::AllocationDecider;
use crate::decision::Decision;
use crate::routing_allocation::RoutingAllocation;

const NAME: &str = "rebalance_only_when_active";

/// Only rebalances shards whose copies are all active
#[derive(Debug, Default, Clone, Copy)]
pub struct RebalanceOnlyWhenActiveAllocationDecider;

impl AllocationDecider for RebalanceOnlyWhenActiveAllocationDecider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_rebalance_shard(
        &self,
        shard: &ShardRouting,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        if allocation.routing().all_copies_active(shard.shard_id()) {
            Decision::yes(NAME, "rebalancing is allowed as all copies of this shard are active")
        } else {
            Decision::no(
                NAME,
                "rebalancing is not allowed until all copies of this shard are active",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decider::test_support::{Fixture, data_node};
    use crate::decision::Outcome;
    use keystone_cluster_state::IndexMetadata;

    #[test]
    fn test_requires_all_copies_active() {
        let mut fixture = Fixture::new(
            [data_node("a"), data_node("b")],
            [IndexMetadata::new("logs", 1, 1)],
        );
        let decider = RebalanceOnlyWhenActiveAllocationDecider;
        let primary = fixture.start("logs", 0, 0, "a");

        let allocation = fixture.allocation();
        assert_eq!(decider.can_rebalance_shard(&primary, &allocation).outcome(), Outcome::No);

        fixture.start("logs", 0, 1, "b");
        let allocation = fixture.allocation();
        assert_eq!(decider.can_rebalance_shard(&primary, &allocation).outcome(), Outcome::Yes);
    }
}
