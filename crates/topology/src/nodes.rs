//! Immutable node directory snapshots

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Node, NodeId, TopologyError};

/// The set of nodes known to the cluster at one cluster-state version,
/// together with the identity of the local and elected master nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nodes {
    nodes: BTreeMap<NodeId, Node>,
    local_node_id: Option<NodeId>,
    master_node_id: Option<NodeId>,
}

impl Nodes {
    /// Start building an empty directory
    pub fn builder() -> NodesBuilder {
        NodesBuilder::default()
    }

    /// Start building a directory seeded with the contents of this one
    pub fn to_builder(&self) -> NodesBuilder {
        NodesBuilder {
            nodes: self.nodes.values().cloned().collect(),
            local_node_id: self.local_node_id.clone(),
            master_node_id: self.master_node_id.clone(),
        }
    }

    /// Look a node up by id
    #[must_use]
    pub fn get(&self, node_id: &str) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    /// Look a node up by exact name
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.values().find(|node| node.name() == name)
    }

    /// Whether a node with this id is present
    #[must_use]
    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Whether a node with this exact name is present
    #[must_use]
    pub fn contains_name(&self, name: &str) -> bool {
        self.get_by_name(name).is_some()
    }

    /// Iterate over all nodes in id order
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Iterate over the ids of all nodes
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    /// Iterate over master-eligible nodes
    pub fn master_eligible_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|node| node.is_master_eligible())
    }

    /// Iterate over data nodes
    pub fn data_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|node| node.is_data_node())
    }

    /// Number of nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the directory is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The id of the node executing requests against this snapshot
    #[must_use]
    pub const fn local_node_id(&self) -> Option<&NodeId> {
        self.local_node_id.as_ref()
    }

    /// The node executing requests against this snapshot
    #[must_use]
    pub fn local_node(&self) -> Option<&Node> {
        self.local_node_id.as_ref().and_then(|id| self.nodes.get(id))
    }

    /// The id of the elected master, if any
    #[must_use]
    pub const fn master_node_id(&self) -> Option<&NodeId> {
        self.master_node_id.as_ref()
    }

    /// The elected master, if any
    #[must_use]
    pub fn master_node(&self) -> Option<&Node> {
        self.master_node_id.as_ref().and_then(|id| self.nodes.get(id))
    }

    /// A copy of this directory with `node` added or replaced
    #[must_use]
    pub fn with_node(&self, node: Node) -> Self {
        let mut nodes = self.clone();
        nodes.nodes.insert(node.id().clone(), node);
        nodes
    }

    /// A copy of this directory without the node `node_id`.
    ///
    /// Removing the master clears the master id; removing the local node
    /// clears the local id.
    #[must_use]
    pub fn without_node(&self, node_id: &str) -> Self {
        let mut nodes = self.clone();
        nodes.nodes.remove(node_id);
        if nodes.master_node_id.as_ref().is_some_and(|id| id.as_str() == node_id) {
            nodes.master_node_id = None;
        }
        if nodes.local_node_id.as_ref().is_some_and(|id| id.as_str() == node_id) {
            nodes.local_node_id = None;
        }
        nodes
    }
}

impl<'a> IntoIterator for &'a Nodes {
    type Item = &'a Node;
    type IntoIter = std::collections::btree_map::Values<'a, NodeId, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.values()
    }
}

/// Builder for [`Nodes`]
#[derive(Debug, Default)]
#[must_use]
pub struct NodesBuilder {
    nodes: Vec<Node>,
    local_node_id: Option<NodeId>,
    master_node_id: Option<NodeId>,
}

impl NodesBuilder {
    /// Add a node; adding the same id twice fails at build time
    pub fn add(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add several nodes
    pub fn add_all(mut self, nodes: impl IntoIterator<Item = Node>) -> Self {
        self.nodes.extend(nodes);
        self
    }

    /// Remove a node by id
    pub fn remove(mut self, node_id: &str) -> Self {
        self.nodes.retain(|node| node.id().as_str() != node_id);
        self
    }

    /// Set the id of the local node
    pub fn local_node_id(mut self, node_id: impl Into<NodeId>) -> Self {
        self.local_node_id = Some(node_id.into());
        self
    }

    /// Set the id of the elected master
    pub fn master_node_id(mut self, node_id: impl Into<NodeId>) -> Self {
        self.master_node_id = Some(node_id.into());
        self
    }

    /// Build the directory
    ///
    /// # Errors
    ///
    /// Fails on duplicate node ids, or if the local or master id is not one of
    /// the added nodes.
    pub fn build(self) -> Result<Nodes, TopologyError> {
        let mut nodes = BTreeMap::new();
        for node in self.nodes {
            let id = node.id().clone();
            if nodes.insert(id.clone(), node).is_some() {
                return Err(TopologyError::DuplicateNode(id.to_string()));
            }
        }

        for id in [&self.local_node_id, &self.master_node_id].into_iter().flatten() {
            if !nodes.contains_key(id) {
                return Err(TopologyError::UnknownNode(id.to_string()));
            }
        }

        Ok(Nodes {
            nodes,
            local_node_id: self.local_node_id,
            master_node_id: self.master_node_id,
        })
    }
}
