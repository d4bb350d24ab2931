//! Node identity within a cluster

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::{NodeId, NodeRole};

/// Software version assumed for nodes that don't declare one.
pub const DEFAULT_NODE_VERSION: Version = Version::new(1, 0, 0);

/// A node as recorded in a node directory snapshot.
///
/// Nodes are immutable once created; a changed node is a new value.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Node {
    id: NodeId,
    name: String,
    attributes: BTreeMap<String, String>,
    roles: BTreeSet<NodeRole>,
    version: Version,
}

impl Node {
    /// Create a node from all of its fields
    pub fn new(
        id: impl Into<NodeId>,
        name: impl Into<String>,
        attributes: BTreeMap<String, String>,
        roles: BTreeSet<NodeRole>,
        version: Version,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            attributes,
            roles,
            version,
        }
    }

    /// Start building a node with no roles, no attributes and the default version
    pub fn builder(id: impl Into<NodeId>, name: impl Into<String>) -> NodeBuilder {
        NodeBuilder {
            id: id.into(),
            name: name.into(),
            attributes: BTreeMap::new(),
            roles: BTreeSet::new(),
            version: DEFAULT_NODE_VERSION,
        }
    }

    /// Get the node ID of this node
    #[must_use]
    pub const fn id(&self) -> &NodeId {
        &self.id
    }

    /// Get the human readable name of this node
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the custom attributes of this node
    #[must_use]
    pub const fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Get a single custom attribute
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Get the roles of this node
    #[must_use]
    pub const fn roles(&self) -> &BTreeSet<NodeRole> {
        &self.roles
    }

    /// Check whether the node has a role
    #[must_use]
    pub fn has_role(&self, role: NodeRole) -> bool {
        self.roles.contains(&role)
    }

    /// Whether this node may vote on cluster-state commits
    #[must_use]
    pub fn is_master_eligible(&self) -> bool {
        self.has_role(NodeRole::Master)
    }

    /// Whether this node can hold shards
    #[must_use]
    pub fn is_data_node(&self) -> bool {
        self.has_role(NodeRole::Data)
    }

    /// Get the software version of this node
    #[must_use]
    pub const fn version(&self) -> &Version {
        &self.version
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{{{}}}", self.name, self.id)
    }
}

/// Staged builder for [`Node`], consumed by [`NodeBuilder::build`].
#[derive(Debug)]
#[must_use]
pub struct NodeBuilder {
    id: NodeId,
    name: String,
    attributes: BTreeMap<String, String>,
    roles: BTreeSet<NodeRole>,
    version: Version,
}

impl NodeBuilder {
    /// Add a role
    pub fn role(mut self, role: NodeRole) -> Self {
        self.roles.insert(role);
        self
    }

    /// Replace the roles
    pub fn roles(mut self, roles: impl IntoIterator<Item = NodeRole>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }

    /// Add a custom attribute
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Set the software version
    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Build the node
    #[must_use]
    pub fn build(self) -> Node {
        Node {
            id: self.id,
            name: self.name,
            attributes: self.attributes,
            roles: self.roles,
            version: self.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_all_fields() {
        let node = Node::builder("n1", "node-1")
            .role(NodeRole::Master)
            .role(NodeRole::Data)
            .attribute("zone", "a")
            .version(Version::new(2, 1, 0))
            .build();

        assert_eq!(node.id().as_str(), "n1");
        assert_eq!(node.name(), "node-1");
        assert!(node.is_master_eligible());
        assert!(node.is_data_node());
        assert!(!node.has_role(NodeRole::Ingest));
        assert_eq!(node.attribute("zone"), Some("a"));
        assert_eq!(node.version(), &Version::new(2, 1, 0));
        assert_eq!(node.to_string(), "{node-1}{n1}");
    }
}
