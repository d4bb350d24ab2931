use keystone_cluster_state::{RecoverySource, ShardRouting};
use keystone_topology::Node;

use super::AllocationDecider;
use crate::decision::Decision;
use crate::routing_allocation::RoutingAllocation;

const NAME: &str = "throttling";

/// Limits concurrent recoveries per node
#[derive(Debug, Default, Clone, Copy)]
pub struct ThrottlingAllocationDecider;

impl AllocationDecider for ThrottlingAllocationDecider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_allocate(
        &self,
        shard: &ShardRouting,
        node: &Node,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        let settings = allocation.settings();
        let routing = allocation.routing();
        let node_id = node.id().as_str();

        let initial_primary = shard.primary()
            && shard.unassigned()
            && !matches!(shard.recovery_source(), Some(RecoverySource::Peer));
        if initial_primary {
            let limit = settings.node_initial_primaries_recoveries;
            let recoveries = routing.initial_primary_recoveries(node_id);
            if recoveries >= limit {
                return Decision::throttle(
                    NAME,
                    format!(
                        "reached the limit of ongoing initial primary recoveries [{recoveries}], cluster setting [cluster.routing.allocation.node_initial_primaries_recoveries={limit}]"
                    ),
                );
            }
            return Decision::yes(NAME, "below primary recovery limit");
        }

        let incoming_limit = settings.node_concurrent_incoming_recoveries;
        let incoming = routing.incoming_recoveries(node_id);
        if incoming >= incoming_limit {
            return Decision::throttle(
                NAME,
                format!(
                    "reached the limit of incoming shard recoveries [{incoming}], cluster setting [cluster.routing.allocation.node_concurrent_incoming_recoveries={incoming_limit}]"
                ),
            );
        }

        // the copy is recovered from the shard's current node when moving,
        // otherwise from its primary
        let source = shard.current_node().or_else(|| {
            routing
                .active_primary(shard.shard_id())
                .and_then(ShardRouting::current_node)
        });
        if let Some(source) = source {
            let outgoing_limit = settings.node_concurrent_outgoing_recoveries;
            let outgoing = routing.outgoing_recoveries(source.as_str());
            if outgoing >= outgoing_limit {
                return Decision::throttle(
                    NAME,
                    format!(
                        "reached the limit of outgoing shard recoveries [{outgoing}] on the node [{source}] which holds the source copy, cluster setting [cluster.routing.allocation.node_concurrent_outgoing_recoveries={outgoing_limit}]"
                    ),
                );
            }
        }
        Decision::yes(NAME, "below shard recovery limit")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decider::test_support::{Fixture, data_node};
    use crate::decision::Outcome;
    use keystone_cluster_state::IndexMetadata;

    #[test]
    fn test_initial_primary_limit() {
        let mut fixture = Fixture::new([data_node("a")], [IndexMetadata::new("logs", 3, 0)]);
        fixture.settings.node_initial_primaries_recoveries = 2;
        fixture.initialize("logs", 0, 0, "a");
        let third = fixture.shard("logs", 2, 0);

        let allocation = fixture.allocation();
        assert_eq!(
            ThrottlingAllocationDecider
                .can_allocate(&third, fixture.node("a"), &allocation)
                .outcome(),
            Outcome::Yes
        );

        fixture.initialize("logs", 1, 0, "a");
        let allocation = fixture.allocation();
        assert_eq!(
            ThrottlingAllocationDecider
                .can_allocate(&third, fixture.node("a"), &allocation)
                .outcome(),
            Outcome::Throttle
        );
    }

    #[test]
    fn test_incoming_and_outgoing_limits() {
        let mut fixture = Fixture::new(
            [data_node("a"), data_node("b"), data_node("c")],
            [IndexMetadata::new("logs", 2, 1)],
        );
        fixture.settings.node_concurrent_incoming_recoveries = 1;
        fixture.settings.node_concurrent_outgoing_recoveries = 1;
        fixture.start("logs", 0, 0, "a");
        fixture.start("logs", 1, 0, "a");
        fixture.initialize("logs", 0, 1, "b");
        let replica = fixture.shard("logs", 1, 1);

        let allocation = fixture.allocation();
        let decision =
            ThrottlingAllocationDecider.can_allocate(&replica, fixture.node("b"), &allocation);
        assert_eq!(decision.outcome(), Outcome::Throttle);
        assert!(decision.explanation().unwrap().contains("incoming"));

        // node c has room but the primary's node is already sending a copy
        let decision =
            ThrottlingAllocationDecider.can_allocate(&replica, fixture.node("c"), &allocation);
        assert_eq!(decision.outcome(), Outcome::Throttle);
        assert!(decision.explanation().unwrap().contains("outgoing"));
    }
}
