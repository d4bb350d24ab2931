//! Weight based shards allocator
//!
//! A node's weight for an index combines how far its total shard count and
//! its shard count for that index are from the cluster averages. Shards go to
//! the lowest weighted node the deciders accept, and move from heavy to light
//! nodes while the weight difference exceeds the balance threshold.

use std::collections::{BTreeSet, HashMap};

use keystone_cluster_state::{ShardRouting, settings::BalanceSettings};
use keystone_topology::{Node, NodeId};
use tracing::{debug, info};

use super::ShardsAllocator;
use crate::decider::AllocationDeciders;
use crate::decision::Outcome;
use crate::routing_allocation::RoutingAllocation;

/// The default shards allocator
#[derive(Debug, Default, Clone, Copy)]
pub struct BalancedShardsAllocator;

impl ShardsAllocator for BalancedShardsAllocator {
    fn allocate(&self, allocation: &mut RoutingAllocation<'_>, deciders: &AllocationDeciders) {
        if allocation.nodes().data_nodes().next().is_none() {
            debug!("No data nodes, skipping allocation");
            return;
        }
        move_shards(allocation, deciders);
        allocate_unassigned(allocation, deciders);
        rebalance(allocation, deciders);
    }
}

/// Node a copy occupies once in-flight relocations complete
fn effective_node(shard: &ShardRouting) -> Option<&NodeId> {
    if shard.relocating() {
        shard.relocating_node()
    } else {
        shard.current_node()
    }
}

/// Normalized `(shard, index)` weight factors
fn theta(balance: &BalanceSettings) -> Option<(f64, f64)> {
    let sum = balance.shard + balance.index;
    (sum > 0.0).then(|| (balance.shard / sum, balance.index / sum))
}

/// Data nodes with their weight for `index`, lightest first
#[allow(clippy::cast_precision_loss)]
fn sorted_nodes<'a>(allocation: &RoutingAllocation<'a>, index: &str) -> Vec<(f64, &'a Node)> {
    let (theta_shard, theta_index) = theta(&allocation.settings().balance).unwrap_or((0.5, 0.5));
    let data_nodes: Vec<&'a Node> = allocation.nodes().data_nodes().collect();
    let node_count = data_nodes.len().max(1) as f64;

    let mut shards: HashMap<&str, usize> = HashMap::new();
    let mut index_shards: HashMap<&str, usize> = HashMap::new();
    let mut total = 0usize;
    let mut index_total = 0usize;
    for shard in allocation.routing().iter() {
        total += 1;
        let in_index = shard.shard_id().index() == index;
        if in_index {
            index_total += 1;
        }
        if let Some(node_id) = effective_node(shard) {
            *shards.entry(node_id.as_str()).or_default() += 1;
            if in_index {
                *index_shards.entry(node_id.as_str()).or_default() += 1;
            }
        }
    }
    let avg_shards = total as f64 / node_count;
    let avg_index_shards = index_total as f64 / node_count;

    let mut weighted: Vec<(f64, &'a Node)> = data_nodes
        .into_iter()
        .map(|node| {
            let id = node.id().as_str();
            let node_shards = shards.get(id).copied().unwrap_or(0) as f64;
            let node_index_shards = index_shards.get(id).copied().unwrap_or(0) as f64;
            let weight = theta_shard.mul_add(
                node_shards - avg_shards,
                theta_index * (node_index_shards - avg_index_shards),
            );
            (weight, node)
        })
        .collect();
    weighted.sort_by(|(a, node_a), (b, node_b)| {
        a.total_cmp(b).then_with(|| node_a.id().cmp(node_b.id()))
    });
    weighted
}

/// Relocate started shards that may no longer remain where they are
fn move_shards(allocation: &mut RoutingAllocation<'_>, deciders: &AllocationDeciders) {
    let started: Vec<ShardRouting> = allocation
        .routing()
        .iter()
        .filter(|shard| shard.started())
        .cloned()
        .collect();

    for shard in started {
        let Some(node) = shard
            .current_node()
            .and_then(|id| allocation.nodes().get(id.as_str()))
        else {
            continue;
        };
        if !deciders.can_remain(&shard, node, allocation).is_no() {
            continue;
        }

        let target = sorted_nodes(allocation, shard.shard_id().index())
            .into_iter()
            .map(|(_, candidate)| candidate)
            .filter(|candidate| candidate.id() != node.id())
            .find(|candidate| deciders.can_allocate(&shard, candidate, allocation).is_yes());
        match target {
            Some(target) => {
                info!(
                    "Moving shard {} from [{}] to [{}] as it can no longer remain",
                    shard.shard_id(),
                    node.id(),
                    target.id()
                );
                allocation.update(shard.relocate(target.id().clone()));
            }
            None => debug!(
                "Shard {} cannot remain on [{}] but no other node accepts it",
                shard.shard_id(),
                node.id()
            ),
        }
    }
}

/// Place unassigned copies, primaries first
fn allocate_unassigned(allocation: &mut RoutingAllocation<'_>, deciders: &AllocationDeciders) {
    let unassigned: Vec<ShardRouting> = allocation
        .routing()
        .unassigned()
        .into_iter()
        .cloned()
        .collect();

    for shard in unassigned {
        let mut throttled = false;
        let mut target = None;
        for (_, node) in sorted_nodes(allocation, shard.shard_id().index()) {
            match deciders.can_allocate(&shard, node, allocation).outcome() {
                Outcome::Yes => {
                    target = Some(node);
                    break;
                }
                Outcome::Throttle => throttled = true,
                Outcome::No => {}
            }
        }

        match target {
            Some(node) => {
                debug!(
                    "Assigning {} shard {} to [{}]",
                    if shard.primary() { "primary" } else { "replica" },
                    shard.shard_id(),
                    node.id()
                );
                allocation.update(shard.initialize(node.id().clone()));
            }
            None if throttled => debug!("Allocation of shard {} is throttled", shard.shard_id()),
            None => debug!("No node can hold shard {}", shard.shard_id()),
        }
    }
}

/// Move shards from heavy to light nodes while it improves balance
fn rebalance(allocation: &mut RoutingAllocation<'_>, deciders: &AllocationDeciders) {
    if !deciders.can_rebalance(allocation).is_yes() {
        debug!("Rebalancing is not allowed");
        return;
    }
    let Some((theta_shard, theta_index)) = theta(&allocation.settings().balance) else {
        return;
    };
    let step = theta_shard + theta_index;
    let threshold = allocation.settings().balance.threshold;

    let indices: BTreeSet<String> = allocation
        .routing()
        .shard_ids()
        .map(|shard_id| shard_id.index().to_string())
        .collect();

    for index in indices {
        let max_moves = allocation.routing().index_shards(&index).count();
        for _ in 0..max_moves {
            let nodes = sorted_nodes(allocation, &index);
            let Some(&(heavy_weight, heavy)) = nodes.last() else {
                break;
            };

            let candidates: Vec<ShardRouting> = allocation
                .routing()
                .index_shards(&index)
                .filter(|shard| shard.started() && shard.current_node() == Some(heavy.id()))
                .cloned()
                .collect();

            let relocation = nodes
                .iter()
                .take_while(|(weight, _)| {
                    let delta = heavy_weight - weight;
                    delta > threshold && delta > step
                })
                .find_map(|(_, light)| {
                    candidates
                        .iter()
                        .find(|shard| {
                            deciders.can_rebalance_shard(shard, allocation).is_yes()
                                && deciders.can_allocate(shard, light, allocation).is_yes()
                        })
                        .map(|shard| (shard.clone(), *light))
                });

            let Some((shard, light)) = relocation else {
                break;
            };
            info!(
                "Rebalancing shard {} from [{}] to [{}]",
                shard.shard_id(),
                heavy.id(),
                light.id()
            );
            allocation.update(shard.relocate(light.id().clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decider::DeciderRegistry;
    use crate::decider::test_support::{Fixture, data_node};
    use keystone_cluster_state::IndexMetadata;

    #[test]
    fn test_primaries_spread_across_nodes() {
        let fixture = Fixture::new(
            [data_node("a"), data_node("b")],
            [IndexMetadata::new("logs", 4, 0)],
        );
        let deciders = DeciderRegistry::with_builtins().build().unwrap();
        let mut allocation = fixture.allocation();

        BalancedShardsAllocator.allocate(&mut allocation, &deciders);

        assert!(allocation.changed());
        let routing = allocation.into_routing();
        assert_eq!(routing.shards_on_node("a").count(), 2);
        assert_eq!(routing.shards_on_node("b").count(), 2);
        assert!(routing.iter().all(ShardRouting::initializing));
    }

    #[test]
    fn test_rebalances_to_new_node() {
        let mut fixture = Fixture::new(
            [data_node("a"), data_node("b")],
            [IndexMetadata::new("logs", 4, 0)],
        );
        fixture.settings.cluster_concurrent_rebalance = -1;
        for id in 0..4 {
            fixture.start("logs", id, 0, "a");
        }
        let deciders = DeciderRegistry::with_builtins().build().unwrap();
        let mut allocation = fixture.allocation();

        BalancedShardsAllocator.allocate(&mut allocation, &deciders);

        let routing = allocation.into_routing();
        assert_eq!(routing.relocating_count(), 2);
        assert_eq!(routing.shards_on_node_including_incoming("b").count(), 2);
    }

    #[test]
    fn test_weight_prefers_emptier_node() {
        let mut fixture = Fixture::new(
            [data_node("a"), data_node("b")],
            [IndexMetadata::new("logs", 1, 0), IndexMetadata::new("other", 2, 0)],
        );
        fixture.start("other", 0, 0, "a");
        let allocation = fixture.allocation();
        let nodes = sorted_nodes(&allocation, "logs");
        assert_eq!(nodes[0].1.id().as_str(), "b");
        assert!(nodes[0].0 < nodes[1].0);
    }
}
