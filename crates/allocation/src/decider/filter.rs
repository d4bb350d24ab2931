use keystone_cluster_state::{AllocationFilters, ShardRouting};
use keystone_topology::Node;

use super::AllocationDecider;
use crate::decision::Decision;
use crate::routing_allocation::RoutingAllocation;

const NAME: &str = "filter";

/// Applies `require`, `include` and `exclude` node filters.
///
/// Index filters are checked first, then cluster filters. Both apply to
/// allocating and to remaining.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilterAllocationDecider;

impl FilterAllocationDecider {
    fn should_filter(
        shard: &ShardRouting,
        node: &Node,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        if let Some(index) = allocation.index(shard.shard_id().index()) {
            if let Some(decision) = check(
                &index.settings().filters,
                node,
                "index.routing.allocation",
                "index setting",
            ) {
                return decision;
            }
        }
        if let Some(decision) = check(
            &allocation.settings().filters,
            node,
            "cluster.routing.allocation",
            "cluster setting",
        ) {
            return decision;
        }
        Decision::yes(NAME, "node passes include/exclude/require filters")
    }
}

fn check(filters: &AllocationFilters, node: &Node, prefix: &str, source: &str) -> Option<Decision> {
    if !filters.require.is_empty() && !filters.require.matches_all(node) {
        return Some(Decision::no(
            NAME,
            format!(
                "node does not match {source} [{prefix}.require] filters [{}]",
                filters.require
            ),
        ));
    }
    if !filters.include.is_empty() && !filters.include.matches_any(node) {
        return Some(Decision::no(
            NAME,
            format!(
                "node does not match {source} [{prefix}.include] filters [{}]",
                filters.include
            ),
        ));
    }
    if !filters.exclude.is_empty() && filters.exclude.matches_any(node) {
        return Some(Decision::no(
            NAME,
            format!(
                "node matches {source} [{prefix}.exclude] filters [{}]",
                filters.exclude
            ),
        ));
    }
    None
}

impl AllocationDecider for FilterAllocationDecider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_allocate(
        &self,
        shard: &ShardRouting,
        node: &Node,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        Self::should_filter(shard, node, allocation)
    }

    fn can_remain(
        &self,
        shard: &ShardRouting,
        node: &Node,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        Self::should_filter(shard, node, allocation)
    }
}
