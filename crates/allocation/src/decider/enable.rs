use keystone_cluster_state::{EnableAllocation, EnableRebalance, RecoverySource, ShardRouting};
use keystone_topology::Node;

use super::{AllocationDecider, setting_source};
use crate::decision::Decision;
use crate::routing_allocation::RoutingAllocation;

const NAME: &str = "enable";

/// Applies the cluster and index level `enable` switches
#[derive(Debug, Default, Clone, Copy)]
pub struct EnableAllocationDecider;

impl AllocationDecider for EnableAllocationDecider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_allocate(
        &self,
        shard: &ShardRouting,
        _node: &Node,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        let index_level = allocation
            .index(shard.shard_id().index())
            .and_then(|index| index.settings().allocation_enable);
        let enable = index_level.unwrap_or(allocation.settings().enable);
        let key = if index_level.is_some() {
            "index.routing.allocation.enable"
        } else {
            "cluster.routing.allocation.enable"
        };
        let source = setting_source(index_level.is_some());

        match enable {
            EnableAllocation::All => Decision::yes(NAME, "all allocations are allowed"),
            EnableAllocation::None => Decision::no(
                NAME,
                format!("no allocations are allowed due to {source} [{key}={enable}]"),
            ),
            EnableAllocation::NewPrimaries => {
                let new_primary = shard.primary()
                    && shard.unassigned()
                    && matches!(
                        shard.recovery_source(),
                        Some(RecoverySource::EmptyStore | RecoverySource::LocalShards)
                    );
                if new_primary {
                    Decision::yes(NAME, "new primary allocations are allowed")
                } else {
                    Decision::no(
                        NAME,
                        format!(
                            "non-new primary allocations are forbidden due to {source} [{key}={enable}]"
                        ),
                    )
                }
            }
            EnableAllocation::Primaries => {
                if shard.primary() {
                    Decision::yes(NAME, "primary allocations are allowed")
                } else {
                    Decision::no(
                        NAME,
                        format!("replica allocations are forbidden due to {source} [{key}={enable}]"),
                    )
                }
            }
        }
    }

    fn can_rebalance_shard(
        &self,
        shard: &ShardRouting,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        let index_level = allocation
            .index(shard.shard_id().index())
            .and_then(|index| index.settings().rebalance_enable);
        let enable = index_level.unwrap_or(allocation.settings().rebalance_enable);
        let key = if index_level.is_some() {
            "index.routing.rebalance.enable"
        } else {
            "cluster.routing.rebalance.enable"
        };
        let source = setting_source(index_level.is_some());

        let allowed = match enable {
            EnableRebalance::All => true,
            EnableRebalance::None => false,
            EnableRebalance::Primaries => shard.primary(),
            EnableRebalance::Replicas => !shard.primary(),
        };
        if allowed {
            Decision::yes(NAME, format!("rebalancing is allowed by {source} [{key}={enable}]"))
        } else {
            Decision::no(
                NAME,
                format!("rebalancing is forbidden for this shard due to {source} [{key}={enable}]"),
            )
        }
    }
}
