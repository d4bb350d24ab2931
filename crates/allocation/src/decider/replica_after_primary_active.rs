use keystone_cluster_state::ShardRouting;
use keystone_topology::Node;

use super::AllocationDecider;
use crate::decision::Decision;
use crate::routing_allocation::RoutingAllocation;

const NAME: &str = "replica_after_primary_active";

/// Holds replicas back until their primary is active
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplicaAfterPrimaryActiveAllocationDecider;

impl AllocationDecider for ReplicaAfterPrimaryActiveAllocationDecider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_allocate(
        &self,
        shard: &ShardRouting,
        _node: &Node,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        if shard.primary() {
            return Decision::yes(NAME, "shard is primary and can be allocated");
        }
        if allocation.routing().active_primary(shard.shard_id()).is_none() {
            return Decision::no(NAME, "primary shard for this replica is not yet active");
        }
        Decision::yes(NAME, "primary shard for this replica is already active")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decider::test_support::{Fixture, data_node};
    use crate::decision::Outcome;
    use keystone_cluster_state::IndexMetadata;

    #[test]
    fn test_replica_waits_for_primary() {
        let mut fixture = Fixture::new(
            [data_node("a"), data_node("b")],
            [IndexMetadata::new("logs", 1, 1)],
        );
        let decider = ReplicaAfterPrimaryActiveAllocationDecider;
        let replica = fixture.shard("logs", 0, 1);
        let primary = fixture.shard("logs", 0, 0);

        let allocation = fixture.allocation();
        assert_eq!(
            decider
                .can_allocate(&primary, fixture.node("a"), &allocation)
                .outcome(),
            Outcome::Yes
        );
        assert_eq!(
            decider
                .can_allocate(&replica, fixture.node("b"), &allocation)
                .outcome(),
            Outcome::No
        );

        fixture.initialize("logs", 0, 0, "a");
        let allocation = fixture.allocation();
        assert_eq!(
            decider
                .can_allocate(&replica, fixture.node("b"), &allocation)
                .outcome(),
            Outcome::No
        );

        let mut fixture = Fixture::new(
            [data_node("a"), data_node("b")],
            [IndexMetadata::new("logs", 1, 1)],
        );
        fixture.start("logs", 0, 0, "a");
        let allocation = fixture.allocation();
        assert_eq!(
            decider
                .can_allocate(&replica, fixture.node("b"), &allocation)
                .outcome(),
            Outcome::Yes
        );
    }
}
