use keystone_cluster_state::{AllowRebalance, ShardRouting};

use super::AllocationDecider;
use crate::decision::Decision;
use crate::routing_allocation::RoutingAllocation;

const NAME: &str = "cluster_rebalance";
const SETTING: &str = "cluster.routing.allocation.allow_rebalance";

/// Gates rebalancing on the cluster-wide shard states
#[derive(Debug, Default, Clone, Copy)]
pub struct ClusterRebalanceAllocationDecider;

impl AllocationDecider for ClusterRebalanceAllocationDecider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_rebalance_shard(
        &self,
        _shard: &ShardRouting,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        self.can_rebalance(allocation)
    }

    fn can_rebalance(&self, allocation: &RoutingAllocation<'_>) -> Decision {
        let policy = allocation.settings().allow_rebalance;
        let routing = allocation.routing();
        match policy {
            AllowRebalance::Always => {
                Decision::yes(NAME, format!("rebalancing is always allowed, [{SETTING}={policy}]"))
            }
            AllowRebalance::IndicesPrimariesActive if !routing.all_primaries_active() => {
                Decision::no(
                    NAME,
                    format!(
                        "the cluster has inactive primary shards and cluster setting [{SETTING}={policy}]"
                    ),
                )
            }
            AllowRebalance::IndicesAllActive if !routing.all_active() => Decision::no(
                NAME,
                format!("the cluster has inactive shards and cluster setting [{SETTING}={policy}]"),
            ),
            _ => Decision::yes(NAME, "all required shards are active"),
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
    fn test_policies() {
        let mut fixture = Fixture::new(
            [data_node("a"), data_node("b")],
            [IndexMetadata::new("logs", 1, 1)],
        );
        fixture.start("logs", 0, 0, "a");
        let decider = ClusterRebalanceAllocationDecider;

        let allocation = fixture.allocation();
        assert_eq!(decider.can_rebalance(&allocation).outcome(), Outcome::No);

        fixture.settings.allow_rebalance = AllowRebalance::IndicesPrimariesActive;
        let allocation = fixture.allocation();
        assert_eq!(decider.can_rebalance(&allocation).outcome(), Outcome::Yes);

        let mut fixture = Fixture::new([data_node("a")], [IndexMetadata::new("logs", 1, 0)]);
        fixture.settings.allow_rebalance = AllowRebalance::Always;
        let allocation = fixture.allocation();
        assert_eq!(decider.can_rebalance(&allocation).outcome(), Outcome::Yes);

        fixture.settings.allow_rebalance = AllowRebalance::IndicesPrimariesActive;
        let allocation = fixture.allocation();
        assert_eq!(decider.can_rebalance(&allocation).outcome(), Outcome::No);
    }
}
