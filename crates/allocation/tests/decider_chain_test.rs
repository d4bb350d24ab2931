use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use assert_matches::assert_matches;
use keystone_allocation::{
    AllocationDecider, AllocationDeciders, AllocationError, ClusterInfo, DeciderRegistry, Decision,
    Outcome, RoutingAllocation,
};
use keystone_cluster_state::{
    AllocationSettings, ClusterState, IndexMetadata, Metadata, RecoverySource, RoutingTable,
    ShardId, ShardRouting,
};
use keystone_topology::{Node, NodeRole, Nodes};

struct Recording {
    name: &'static str,
    outcome: Outcome,
    calls: Arc<AtomicUsize>,
}

impl Recording {
    fn new(name: &'static str, outcome: Outcome) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                name,
                outcome,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl AllocationDecider for Recording {
    fn name(&self) -> &'static str {
        self.name
    }

    fn can_allocate(
        &self,
        _shard: &ShardRouting,
        _node: &Node,
        _allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Decision::single(self.outcome, self.name, "recorded")
    }
}

struct PluginDecider;

impl AllocationDecider for PluginDecider {
    fn name(&self) -> &'static str {
        "plugin"
    }
}

fn state() -> ClusterState {
    let index = IndexMetadata::new("logs", 1, 0);
    let mut routing = RoutingTable::new();
    routing.add_index(&index, &RecoverySource::EmptyStore);
    ClusterState::builder()
        .nodes(
            Nodes::builder()
                .add(Node::builder("a", "node-a").role(NodeRole::Data).build())
                .build()
                .unwrap(),
        )
        .metadata(Metadata::default().with_index(index))
        .routing_table(routing)
        .build()
}

#[test]
fn test_builtin_order_and_plugins_last() {
    let deciders = DeciderRegistry::with_builtins()
        .register(PluginDecider)
        .build()
        .unwrap();

    assert_eq!(
        deciders.names().collect::<Vec<_>>(),
        vec![
            "max_retry",
            "resize",
            "replica_after_primary_active",
            "rebalance_only_when_active",
            "cluster_rebalance",
            "concurrent_rebalance",
            "enable",
            "node_version",
            "snapshot_in_progress",
            "restore_in_progress",
            "filter",
            "same_shard",
            "disk_threshold",
            "throttling",
            "shards_limit",
            "awareness",
            "plugin",
        ]
    );
}

#[test]
fn test_duplicate_decider_type_is_rejected() {
    let result = DeciderRegistry::with_builtins()
        .register(PluginDecider)
        .register(PluginDecider)
        .build();
    assert_matches!(
        result.err(),
        Some(AllocationError::DuplicateDecider(name)) if name.ends_with("PluginDecider")
    );
}

#[test]
fn test_no_short_circuits_the_chain() {
    let (throttle, throttle_calls) = Recording::new("first", Outcome::Throttle);
    let (no, no_calls) = Recording::new("second", Outcome::No);
    let (last, last_calls) = Recording::new("third", Outcome::Yes);
    let deciders = AllocationDeciders::new(vec![Box::new(throttle), Box::new(no), Box::new(last)]);

    let state = state();
    let settings = AllocationSettings::default();
    let info = ClusterInfo::default();
    let allocation = RoutingAllocation::new(&state, &settings, &info);
    let shard = state.routing_table().primary(&ShardId::new("logs", 0)).unwrap();
    let node = state.nodes().get("a").unwrap();

    let decision = deciders.can_allocate(shard, node, &allocation);

    assert_eq!(decision.outcome(), Outcome::No);
    assert_eq!(decision.label(), Some("second"));
    assert_eq!(throttle_calls.load(Ordering::SeqCst), 1);
    assert_eq!(no_calls.load(Ordering::SeqCst), 1);
    assert_eq!(last_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_throttle_wins_over_yes() {
    let (yes, _) = Recording::new("first", Outcome::Yes);
    let (throttle, _) = Recording::new("second", Outcome::Throttle);
    let (last, last_calls) = Recording::new("third", Outcome::Yes);
    let deciders = AllocationDeciders::new(vec![Box::new(yes), Box::new(throttle), Box::new(last)]);

    let state = state();
    let settings = AllocationSettings::default();
    let info = ClusterInfo::default();
    let allocation = RoutingAllocation::new(&state, &settings, &info);
    let shard = state.routing_table().primary(&ShardId::new("logs", 0)).unwrap();

    let decision = deciders.can_allocate(shard, state.nodes().get("a").unwrap(), &allocation);

    assert_eq!(decision.outcome(), Outcome::Throttle);
    assert_eq!(decision.label(), Some("second"));
    assert_eq!(last_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_debug_mode_collects_every_verdict() {
    let (no, _) = Recording::new("first", Outcome::No);
    let (last, last_calls) = Recording::new("second", Outcome::Yes);
    let deciders = AllocationDeciders::new(vec![Box::new(no), Box::new(last)]);

    let state = state();
    let settings = AllocationSettings::default();
    let info = ClusterInfo::default();
    let allocation = RoutingAllocation::new(&state, &settings, &info).with_debug_decisions(true);
    let shard = state.routing_table().primary(&ShardId::new("logs", 0)).unwrap();

    let decision = deciders.can_allocate(shard, state.nodes().get("a").unwrap(), &allocation);

    assert_eq!(decision.outcome(), Outcome::No);
    assert_eq!(decision.decisions().len(), 2);
    assert_eq!(last_calls.load(Ordering::SeqCst), 1);
}
