use std::sync::Arc;

use assert_matches::assert_matches;
use keystone_allocation::{AllocationError, AllocationService, Outcome};
use keystone_cluster_state::{
    ClusterService, ClusterSettings, ClusterState, IndexMetadata, Metadata, Settings, ShardId,
    ShardRouting,
};
use keystone_cluster_state_memory::MemoryClusterService;
use keystone_topology::{Node, NodeRole, Nodes};
use tracing_test::traced_test;

fn nodes(ids: &[&str]) -> Nodes {
    Nodes::builder()
        .add_all(ids.iter().map(|id| {
            Node::builder(*id, format!("node-{id}"))
                .roles([NodeRole::Master, NodeRole::Data])
                .build()
        }))
        .build()
        .unwrap()
}

fn started_all(service: &AllocationService, state: &ClusterState) -> ClusterState {
    let initializing: Vec<ShardRouting> = state
        .routing_table()
        .iter()
        .filter(|shard| shard.initializing())
        .cloned()
        .collect();
    service.apply_started_shards(state, &initializing).unwrap()
}

#[test]
fn test_unknown_allocator_is_a_startup_error() {
    let settings = ClusterSettings::new(
        Settings::builder()
            .set("cluster.routing.allocation.type", "desired_balance")
            .unwrap()
            .build(),
    );
    assert_matches!(
        AllocationService::with_defaults(settings).err(),
        Some(AllocationError::UnknownAllocator(name)) if name == "desired_balance"
    );
}

#[test]
#[traced_test]
fn test_primaries_then_replicas() {
    let service = AllocationService::with_defaults(ClusterSettings::default()).unwrap();
    let state = ClusterState::builder()
        .nodes(nodes(&["a", "b"]))
        .metadata(
            Metadata::default().with_index(IndexMetadata::new("logs", 2, 1)),
        )
        .build();

    let state = service.reroute(&state, "test").unwrap();
    let routing = state.routing_table();
    assert_eq!(routing.iter().filter(|s| s.primary() && s.initializing()).count(), 2);
    assert_eq!(routing.iter().filter(|s| !s.primary() && s.unassigned()).count(), 2);

    let state = started_all(&service, &state);
    let routing = state.routing_table();
    assert!(routing.all_primaries_active());
    assert_eq!(routing.iter().filter(|s| !s.primary() && s.initializing()).count(), 2);
    for shard_id in routing.shard_ids() {
        assert_eq!(routing.nodes_holding(shard_id).len(), 2);
    }

    let state = started_all(&service, &state);
    assert!(state.routing_table().all_active());
}

#[test]
fn test_node_left_promotes_replica() {
    let service = AllocationService::with_defaults(ClusterSettings::default()).unwrap();
    let state = ClusterState::builder()
        .nodes(nodes(&["a", "b"]))
        .metadata(
            Metadata::default().with_index(IndexMetadata::new("logs", 1, 1)),
        )
        .build();
    let state = service.reroute(&state, "test").unwrap();
    let state = started_all(&service, &state);
    let state = started_all(&service, &state);
    let shard_id = ShardId::new("logs", 0);
    let primary_node = state
        .routing_table()
        .primary(&shard_id)
        .and_then(ShardRouting::current_node)
        .unwrap()
        .clone();

    let state = state
        .to_builder()
        .nodes(state.nodes().without_node(primary_node.as_str()))
        .build();
    let state = service.reroute(&state, "node left").unwrap();

    let routing = state.routing_table();
    let primary = routing.primary(&shard_id).unwrap();
    assert!(primary.started());
    assert_ne!(primary.current_node(), Some(&primary_node));
    let replica = routing.copies(&shard_id).iter().find(|s| !s.primary()).unwrap();
    assert!(replica.unassigned());
}

#[test]
fn test_failed_allocations_stop_at_max_retries() {
    let service = AllocationService::with_defaults(ClusterSettings::default()).unwrap();
    let mut state = service
        .reroute(
            &ClusterState::builder()
                .nodes(nodes(&["a"]))
                .metadata(
                    Metadata::default()
                        .with_index(IndexMetadata::new("logs", 1, 0)),
                )
                .build(),
            "test",
        )
        .unwrap();
    let shard_id = ShardId::new("logs", 0);

    for _ in 0..5 {
        let shard = state.routing_table().primary(&shard_id).unwrap().clone();
        assert!(shard.initializing());
        state = service
            .apply_failed_shards(&state, &[(shard, "disk corrupted".to_string())])
            .unwrap();
    }

    let shard = state.routing_table().primary(&shard_id).unwrap();
    assert!(shard.unassigned());
    assert_eq!(shard.unassigned_info().unwrap().failed_allocations(), 5);

    let explanation = service.explain(&state, &shard_id, 0).unwrap();
    let decision = &explanation.node_decisions[0].decision;
    assert_eq!(decision.outcome(), Outcome::No);
    assert_eq!(decision.decisions().len(), 16);
    assert_eq!(decision.decisions()[0].outcome(), Outcome::No);
    assert_eq!(decision.decisions()[0].label(), Some("max_retry"));

    let json = serde_json::to_value(&explanation).unwrap();
    assert!(json["can_remain"].is_null());
    assert_eq!(json["node_decisions"][0]["node_id"], "a");
    assert_eq!(
        json["node_decisions"][0]["decision"]["Multi"][0]["Single"]["outcome"],
        "No"
    );
}

#[tokio::test]
async fn test_reconciles_after_every_task() {
    let settings = ClusterSettings::default();
    let allocation = Arc::new(AllocationService::with_defaults(settings.clone()).unwrap());
    let service = MemoryClusterService::builder()
        .nodes(nodes(&["a", "b"]))
        .settings(settings)
        .reconciler(allocation)
        .build();

    let state = service
        .submit_state_update(
            "create-index",
            Box::new(|state: &ClusterState| {
                Ok(state
                    .to_builder()
                    .metadata(state.metadata().with_index(IndexMetadata::new("logs", 2, 0)))
                    .build())
            }),
        )
        .await
        .unwrap();

    assert_eq!(state.routing_table().iter().count(), 2);
    assert!(state.routing_table().iter().all(ShardRouting::initializing));
}

#[test]
fn test_exclude_filter_moves_shards_away() {
    let settings = ClusterSettings::default();
    let service = AllocationService::with_defaults(settings.clone()).unwrap();
    let state = ClusterState::builder()
        .nodes(nodes(&["a", "b"]))
        .metadata(
            Metadata::default().with_index(IndexMetadata::new("logs", 2, 0)),
        )
        .build();
    let state = service.reroute(&state, "test").unwrap();
    let state = started_all(&service, &state);
    assert_eq!(state.routing_table().shards_on_node("a").count(), 1);

    settings
        .apply("cluster.routing.allocation.exclude._id", "a")
        .unwrap();
    let state = service.reroute(&state, "settings updated").unwrap();

    let moving: Vec<_> = state.routing_table().iter().filter(|s| s.relocating()).collect();
    assert_eq!(moving.len(), 1);
    assert_eq!(moving[0].current_node().map(|n| n.as_str()), Some("a"));
    assert_eq!(moving[0].relocating_node().map(|n| n.as_str()), Some("b"));
}
