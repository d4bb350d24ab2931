use keystone_cluster_state::ShardRouting;
use keystone_topology::Node;

use super::AllocationDecider;
use crate::decision::Decision;
use crate::routing_allocation::RoutingAllocation;

const NAME: &str = "max_retry";

/// Stops allocating a copy once it failed `index.allocation.max_retries` times
#[derive(Debug, Default, Clone, Copy)]
pub struct MaxRetryAllocationDecider;

impl AllocationDecider for MaxRetryAllocationDecider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_allocate(
        &self,
        shard: &ShardRouting,
        _node: &Node,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        let Some(info) = shard.unassigned_info() else {
            return Decision::yes(NAME, "shard has no previous failures");
        };
        let Some(index) = allocation.index(shard.shard_id().index()) else {
            return Decision::YES;
        };
        let max_retries = index.settings().max_retries;
        if info.failed_allocations() >= max_retries {
            Decision::no(
                NAME,
                format!(
                    "shard has exceeded the maximum number of retries [{}] on failed allocation attempts, last failure [{}]",
                    max_retries,
                    info.message().unwrap_or("unknown")
                ),
            )
        } else {
            Decision::yes(
                NAME,
                format!(
                    "shard has failed allocating [{}] times but [{}] retries are allowed",
                    info.failed_allocations(),
                    max_retries
                ),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decider::test_support::{Fixture, data_node};
    use crate::decision::Outcome;
    use keystone_cluster_state::{IndexMetadata, IndexSettings};
    use keystone_topology::NodeId;

    #[test]
    fn test_no_after_max_retries() {
        let index = IndexMetadata::new("logs", 1, 0).with_settings(IndexSettings {
            max_retries: 2,
            ..IndexSettings::default()
        });
        let mut fixture = Fixture::new([data_node("a")], [index]);
        let decider = MaxRetryAllocationDecider;

        let once = fixture.shard("logs", 0, 0).initialize(NodeId::new("a")).fail("boom");
        fixture.set(once.clone());
        let allocation = fixture.allocation();
        assert_eq!(
            decider
                .can_allocate(&once, fixture.node("a"), &allocation)
                .outcome(),
            Outcome::Yes
        );

        let twice = once.initialize(NodeId::new("a")).fail("boom again");
        let decision = decider.can_allocate(&twice, fixture.node("a"), &allocation);
        assert_eq!(decision.outcome(), Outcome::No);
        assert!(decision.explanation().unwrap().contains("[2]"));
        assert!(decision.explanation().unwrap().contains("boom again"));
    }
}
