use std::collections::{BTreeMap, BTreeSet};

use keystone_cluster_state::ShardRouting;
use keystone_topology::Node;

use super::AllocationDecider;
use crate::decision::Decision;
use crate::routing_allocation::RoutingAllocation;

const NAME: &str = "awareness";

/// Spreads the copies of a shard evenly across the values of each awareness
/// attribute, such as zones or racks.
#[derive(Debug, Default, Clone, Copy)]
pub struct AwarenessAllocationDecider;

impl AwarenessAllocationDecider {
    fn under_capacity(
        shard: &ShardRouting,
        node: &Node,
        allocation: &RoutingAllocation<'_>,
        move_to_node: bool,
    ) -> Decision {
        let attributes = &allocation.settings().awareness_attributes;
        if attributes.is_empty() {
            return Decision::yes(NAME, "allocation awareness is not enabled");
        }
        let Some(index) = allocation.index(shard.shard_id().index()) else {
            return Decision::YES;
        };
        let shard_count = index.number_of_replicas() as usize + 1;
        let nodes = allocation.nodes();

        for attribute in attributes {
            let Some(node_value) = node.attribute(attribute) else {
                return Decision::no(
                    NAME,
                    format!(
                        "node does not contain the awareness attribute [{attribute}], required by cluster setting [cluster.routing.allocation.awareness.attributes]"
                    ),
                );
            };

            let values: BTreeSet<&str> = nodes
                .data_nodes()
                .filter_map(|n| n.attribute(attribute))
                .chain(std::iter::once(node_value))
                .collect();

            let value_of = |copy: &ShardRouting| {
                let location = if copy.relocating() {
                    copy.relocating_node()
                } else {
                    copy.current_node()
                };
                location
                    .and_then(|id| nodes.get(id.as_str()))
                    .and_then(|n| n.attribute(attribute))
            };

            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for copy in allocation.routing().copies(shard.shard_id()) {
                if let Some(value) = value_of(copy) {
                    *counts.entry(value).or_default() += 1;
                }
            }
            if move_to_node {
                if let Some(value) = value_of(shard) {
                    if let Some(count) = counts.get_mut(value) {
                        *count = count.saturating_sub(1);
                    }
                }
                *counts.entry(node_value).or_default() += 1;
            }

            let current = counts.get(node_value).copied().unwrap_or(0);
            let required = shard_count.div_ceil(values.len());
            if current > required {
                return Decision::no(
                    NAME,
                    format!(
                        "there are too many copies of the shard allocated to nodes with attribute [{attribute}], there are [{shard_count}] total configured shard copies for this shard id and [{}] total attribute values, expected the allocated shard count per attribute [{current}] to be less than or equal to the upper bound of the required number of shards per attribute [{required}]",
                        values.len()
                    ),
                );
            }
        }
        Decision::yes(NAME, "node meets all awareness attribute requirements")
    }
}

impl AllocationDecider for AwarenessAllocationDecider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_allocate(
        &self,
        shard: &ShardRouting,
        node: &Node,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        Self::under_capacity(shard, node, allocation, true)
    }

    fn can_remain(
        &self,
        shard: &ShardRouting,
        node: &Node,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        Self::under_capacity(shard, node, allocation, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decider::test_support::Fixture;
    use crate::decision::Outcome;
    use keystone_cluster_state::IndexMetadata;
    use keystone_topology::NodeRole;

    fn node(id: &str, zone: Option<&str>) -> Node {
        let builder = Node::builder(id, id).role(NodeRole::Data);
        match zone {
            Some(zone) => builder.attribute("zone", zone).build(),
            None => builder.build(),
        }
    }

    #[test]
    fn test_spreads_copies_across_zones() {
        let mut fixture = Fixture::new(
            [node("a1", Some("a")), node("a2", Some("a")), node("b1", Some("b")), node("x", None)],
            [IndexMetadata::new("logs", 1, 1)],
        );
        fixture.settings.awareness_attributes = vec!["zone".to_string()];
        fixture.start("logs", 0, 0, "a1");
        let replica = fixture.shard("logs", 0, 1);
        let allocation = fixture.allocation();
        let decider = AwarenessAllocationDecider;

        let decision = decider.can_allocate(&replica, fixture.node("a2"), &allocation);
        assert_eq!(decision.outcome(), Outcome::No);
        assert!(decision.explanation().unwrap().contains("too many copies"));
        assert_eq!(
            decider
                .can_allocate(&replica, fixture.node("b1"), &allocation)
                .outcome(),
            Outcome::Yes
        );

        let decision = decider.can_allocate(&replica, fixture.node("x"), &allocation);
        assert!(
            decision
                .explanation()
                .unwrap()
                .contains("does not contain the awareness attribute [zone]")
        );
    }

    #[test]
    fn test_moving_within_zone_is_allowed() {
        let mut fixture = Fixture::new(
            [node("a1", Some("a")), node("a2", Some("a")), node("b1", Some("b"))],
            [IndexMetadata::new("logs", 1, 1)],
        );
        fixture.settings.awareness_attributes = vec!["zone".to_string()];
        let primary = fixture.start("logs", 0, 0, "a1");
        fixture.start("logs", 0, 1, "b1");
        let allocation = fixture.allocation();

        assert_eq!(
            AwarenessAllocationDecider
                .can_allocate(&primary, fixture.node("a2"), &allocation)
                .outcome(),
            Outcome::Yes
        );
        assert_eq!(
            AwarenessAllocationDecider
                .can_remain(&primary, fixture.node("a1"), &allocation)
                .outcome(),
            Outcome::Yes
        );
    }
}
