use keystone_cluster_state::{
    AllocationSettings, ClusterState, IndexMetadata, Metadata, RecoverySource, RoutingTable,
    ShardId, ShardRouting,
};
use keystone_topology::{Node, NodeId, NodeRole, Nodes};

use crate::cluster_info::ClusterInfo;
use crate::routing_allocation::RoutingAllocation;

pub(crate) fn data_node(id: &str) -> Node {
    Node::builder(id, format!("node-{id}"))
        .role(NodeRole::Data)
        .build()
}

pub(crate) struct Fixture {
    pub state: ClusterState,
    pub settings: AllocationSettings,
    pub info: ClusterInfo,
}

impl Fixture {
    pub fn new(
        nodes: impl IntoIterator<Item = Node>,
        indices: impl IntoIterator<Item = IndexMetadata>,
    ) -> Self {
        let nodes = Nodes::builder().add_all(nodes).build().unwrap();
        let mut metadata = Metadata::default();
        let mut routing = RoutingTable::new();
        for index in indices {
            let source = if index.settings().resize_source.is_some() {
                RecoverySource::LocalShards
            } else {
                RecoverySource::EmptyStore
            };
            routing.add_index(&index, &source);
            metadata = metadata.with_index(index);
        }
        Self {
            state: ClusterState::builder()
                .nodes(nodes)
                .metadata(metadata)
                .routing_table(routing)
                .build(),
            settings: AllocationSettings::default(),
            info: ClusterInfo::default(),
        }
    }

    pub fn allocation(&self) -> RoutingAllocation<'_> {
        RoutingAllocation::new(&self.state, &self.settings, &self.info)
    }

    pub fn node(&self, id: &str) -> &Node {
        self.state.nodes().get(id).unwrap()
    }

    pub fn shard(&self, index: &str, id: u32, copy: u32) -> ShardRouting {
        self.state
            .routing_table()
            .get(&ShardId::new(index, id), copy)
            .unwrap()
            .clone()
    }

    pub fn set(&mut self, shard: ShardRouting) {
        let mut routing = self.state.routing_table().clone();
        assert!(routing.update(shard));
        self.state = self.state.to_builder().routing_table(routing).build();
    }

    pub fn initialize(&mut self, index: &str, id: u32, copy: u32, node: &str) -> ShardRouting {
        let shard = self.shard(index, id, copy).initialize(NodeId::new(node));
        self.set(shard.clone());
        shard
    }

    pub fn start(&mut self, index: &str, id: u32, copy: u32, node: &str) -> ShardRouting {
        let shard = self.initialize(index, id, copy, node).start();
        self.set(shard.clone());
        shard
    }
}
