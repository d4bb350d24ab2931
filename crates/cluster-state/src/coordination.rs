//! Voting configuration overlay types
//!
//! The voting configuration is the set of node ids whose votes count towards
//! a quorum when committing a new cluster state. Voting config exclusions mark
//! nodes that must be kept out of that set, whether or not they are currently
//! part of the cluster.

use std::collections::BTreeSet;
use std::fmt;

use keystone_topology::{Node, NodeId, Nodes};
use serde::{Deserialize, Serialize};

/// Rendering of an exclusion field that is not known
pub const MISSING_VALUE_MARKER: &str = "_absent_";

/// An immutable set of node ids defining the quorum
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VotingConfiguration {
    node_ids: BTreeSet<NodeId>,
}

impl VotingConfiguration {
    /// The empty configuration
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            node_ids: BTreeSet::new(),
        }
    }

    /// Create a configuration from node ids
    pub fn new(node_ids: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            node_ids: node_ids.into_iter().collect(),
        }
    }

    /// Create a configuration holding the given nodes
    pub fn of<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Self {
        Self::new(nodes.into_iter().map(|node| node.id().clone()))
    }

    /// Node ids in this configuration
    #[must_use]
    pub const fn node_ids(&self) -> &BTreeSet<NodeId> {
        &self.node_ids
    }

    /// Whether `node_id` votes in this configuration
    #[must_use]
    pub fn contains(&self, node_id: &str) -> bool {
        self.node_ids.contains(node_id)
    }

    /// Number of voters
    #[must_use]
    pub fn len(&self) -> usize {
        self.node_ids.len()
    }

    /// Whether nobody votes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }

    /// Votes needed for a quorum: `floor(n / 2) + 1`
    #[must_use]
    pub fn quorum_size(&self) -> usize {
        self.node_ids.len() / 2 + 1
    }

    /// Whether the given votes form a quorum of this configuration.
    ///
    /// Votes from nodes outside the configuration don't count; an empty
    /// configuration never has a quorum.
    pub fn has_quorum<'a>(&self, votes: impl IntoIterator<Item = &'a NodeId>) -> bool {
        let counted = votes
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter(|id| self.node_ids.contains(*id))
            .count();
        counted * 2 > self.node_ids.len()
    }

    /// The configuration without any of the given ids
    #[must_use]
    pub fn without<'a>(&self, node_ids: impl IntoIterator<Item = &'a NodeId>) -> Self {
        let mut remaining = self.node_ids.clone();
        for id in node_ids {
            remaining.remove(id);
        }
        Self {
            node_ids: remaining,
        }
    }

    /// Ids present in both configurations
    #[must_use]
    pub fn intersection(&self, other: &Self) -> BTreeSet<NodeId> {
        self.node_ids
            .intersection(&other.node_ids)
            .cloned()
            .collect()
    }

    /// The configuration made of every live master-eligible node that is not
    /// excluded by id.
    pub fn from_live_nodes<'a>(
        nodes: &Nodes,
        exclusions: impl IntoIterator<Item = &'a VotingConfigExclusion>,
    ) -> Self {
        let excluded: BTreeSet<&NodeId> =
            exclusions.into_iter().filter_map(VotingConfigExclusion::node_id).collect();
        Self::of(
            nodes
                .master_eligible_nodes()
                .filter(|node| !excluded.contains(&node.id())),
        )
    }
}

impl fmt::Display for VotingConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.node_ids.iter().map(NodeId::as_str).collect();
        write!(f, "VotingConfiguration{{{}}}", ids.join(","))
    }
}

/// A node excluded from voting, identified by id, by name, or both.
///
/// At least one field is always known. Equality and ordering use both fields,
/// so an exclusion by id and one by name for the same absent node are kept
/// apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VotingConfigExclusion {
    node_id: Option<NodeId>,
    node_name: Option<String>,
}

impl VotingConfigExclusion {
    /// Exclude a node that is currently part of the cluster
    #[must_use]
    pub fn from_node(node: &Node) -> Self {
        Self {
            node_id: Some(node.id().clone()),
            node_name: Some(node.name().to_string()),
        }
    }

    /// Exclude a node by id only; its name is not known
    pub fn from_node_id(node_id: impl Into<NodeId>) -> Self {
        Self {
            node_id: Some(node_id.into()),
            node_name: None,
        }
    }

    /// Exclude a node by name only; its id is not known
    pub fn from_node_name(node_name: impl Into<String>) -> Self {
        Self {
            node_id: None,
            node_name: Some(node_name.into()),
        }
    }

    /// The excluded node id, if known
    #[must_use]
    pub const fn node_id(&self) -> Option<&NodeId> {
        self.node_id.as_ref()
    }

    /// The excluded node name, if known
    #[must_use]
    pub fn node_name(&self) -> Option<&str> {
        self.node_name.as_deref()
    }

    /// Whether this exclusion refers to `node`.
    ///
    /// A known id decides on its own; id-less placeholders match by name.
    #[must_use]
    pub fn matches(&self, node: &Node) -> bool {
        match (&self.node_id, &self.node_name) {
            (Some(id), _) => id == node.id(),
            (None, Some(name)) => name == node.name(),
            (None, None) => false,
        }
    }

    /// Whether the excluded node is part of the directory
    #[must_use]
    pub fn is_present_in(&self, nodes: &Nodes) -> bool {
        nodes.iter().any(|node| self.matches(node))
    }
}

impl fmt::Display for VotingConfigExclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}}}{{{}}}",
            self.node_id.as_ref().map_or(MISSING_VALUE_MARKER, NodeId::as_str),
            self.node_name.as_deref().unwrap_or(MISSING_VALUE_MARKER)
        )
    }
}

/// Render a set of exclusions as `[{id}{name}, {id}{name}]`
pub fn format_exclusions<'a>(
    exclusions: impl IntoIterator<Item = &'a VotingConfigExclusion>,
) -> String {
    let rendered: Vec<String> = exclusions.into_iter().map(ToString::to_string).collect();
    format!("[{}]", rendered.join(", "))
}

/// Coordination fields of the cluster metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinationMetadata {
    term: u64,
    last_committed_configuration: VotingConfiguration,
    last_accepted_configuration: VotingConfiguration,
    voting_config_exclusions: BTreeSet<VotingConfigExclusion>,
}

impl CoordinationMetadata {
    /// Start building coordination metadata from scratch
    pub fn builder() -> CoordinationMetadataBuilder {
        CoordinationMetadataBuilder {
            metadata: Self::default(),
        }
    }

    /// Start building a modified copy of this metadata
    pub fn to_builder(&self) -> CoordinationMetadataBuilder {
        CoordinationMetadataBuilder {
            metadata: self.clone(),
        }
    }

    /// The election term
    #[must_use]
    pub const fn term(&self) -> u64 {
        self.term
    }

    /// The durably agreed voting configuration
    #[must_use]
    pub const fn last_committed_configuration(&self) -> &VotingConfiguration {
        &self.last_committed_configuration
    }

    /// The most recently proposed voting configuration
    #[must_use]
    pub const fn last_accepted_configuration(&self) -> &VotingConfiguration {
        &self.last_accepted_configuration
    }

    /// The current exclusions
    #[must_use]
    pub const fn voting_config_exclusions(&self) -> &BTreeSet<VotingConfigExclusion> {
        &self.voting_config_exclusions
    }
}

/// Consuming builder for [`CoordinationMetadata`]
#[derive(Debug)]
#[must_use]
pub struct CoordinationMetadataBuilder {
    metadata: CoordinationMetadata,
}

impl CoordinationMetadataBuilder {
    /// Set the election term
    pub const fn term(mut self, term: u64) -> Self {
        self.metadata.term = term;
        self
    }

    /// Set the committed configuration
    pub fn last_committed_configuration(mut self, config: VotingConfiguration) -> Self {
        self.metadata.last_committed_configuration = config;
        self
    }

    /// Set the accepted configuration
    pub fn last_accepted_configuration(mut self, config: VotingConfiguration) -> Self {
        self.metadata.last_accepted_configuration = config;
        self
    }

    /// Replace the exclusion set
    pub fn voting_config_exclusions(
        mut self,
        exclusions: impl IntoIterator<Item = VotingConfigExclusion>,
    ) -> Self {
        self.metadata.voting_config_exclusions = exclusions.into_iter().collect();
        self
    }

    /// Add one exclusion
    pub fn add_voting_config_exclusion(mut self, exclusion: VotingConfigExclusion) -> Self {
        self.metadata.voting_config_exclusions.insert(exclusion);
        self
    }

    /// Remove every exclusion
    pub fn clear_voting_config_exclusions(mut self) -> Self {
        self.metadata.voting_config_exclusions.clear();
        self
    }

    /// Build the metadata
    #[must_use]
    pub fn build(self) -> CoordinationMetadata {
        self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_topology::NodeRole;

    fn ids(ids: &[&str]) -> Vec<NodeId> {
        ids.iter().map(|id| NodeId::new(*id)).collect()
    }

    #[test]
    fn test_quorum_arithmetic() {
        let config = VotingConfiguration::new(ids(&["a", "b", "c"]));
        assert_eq!(config.quorum_size(), 2);
        assert!(!config.has_quorum(&ids(&["a"])));
        assert!(config.has_quorum(&ids(&["a", "b"])));
        // Votes from outside the configuration don't count, nor do duplicates
        assert!(!config.has_quorum(&ids(&["a", "x", "y"])));
        assert!(!config.has_quorum(&ids(&["a", "a"])));

        let four = VotingConfiguration::new(ids(&["a", "b", "c", "d"]));
        assert_eq!(four.quorum_size(), 3);
        assert!(!four.has_quorum(&ids(&["a", "b"])));
        assert!(four.has_quorum(&ids(&["a", "b", "c"])));

        assert!(!VotingConfiguration::empty().has_quorum(&ids(&["a"])));
    }

    #[test]
    fn test_exclusion_rendering_uses_missing_marker() {
        assert_eq!(
            VotingConfigExclusion::from_node_id("absent_id").to_string(),
            "{absent_id}{_absent_}"
        );
        assert_eq!(
            VotingConfigExclusion::from_node_name("absent_node").to_string(),
            "{_absent_}{absent_node}"
        );

        let node = Node::builder("id1", "node1").role(NodeRole::Master).build();
        let exclusions = [
            VotingConfigExclusion::from_node(&node),
            VotingConfigExclusion::from_node_name("other"),
        ];
        assert_eq!(
            format_exclusions(&exclusions),
            "[{id1}{node1}, {_absent_}{other}]"
        );
    }

    #[test]
    fn test_exclusion_equality_uses_both_fields() {
        let node = Node::builder("id1", "node1").role(NodeRole::Master).build();
        let full = VotingConfigExclusion::from_node(&node);
        let by_id = VotingConfigExclusion::from_node_id("id1");
        let by_name = VotingConfigExclusion::from_node_name("node1");

        let set: BTreeSet<_> = [full.clone(), by_id.clone(), by_name.clone()].into();
        assert_eq!(set.len(), 3);

        assert!(full.matches(&node));
        assert!(by_id.matches(&node));
        assert!(by_name.matches(&node));
        assert!(!VotingConfigExclusion::from_node_id("id2").matches(&node));
    }

    #[test]
    fn test_configuration_from_live_nodes_skips_excluded_and_non_voters() {
        let nodes = Nodes::builder()
            .add(Node::builder("a", "a").role(NodeRole::Master).build())
            .add(Node::builder("b", "b").role(NodeRole::Master).build())
            .add(Node::builder("d", "d").role(NodeRole::Data).build())
            .build()
            .unwrap();
        let exclusions = [
            VotingConfigExclusion::from_node_id("b"),
            VotingConfigExclusion::from_node_name("a"),
        ];

        // Name-only placeholders don't remove anyone by id
        let config = VotingConfiguration::from_live_nodes(&nodes, &exclusions);
        assert_eq!(config, VotingConfiguration::new(ids(&["a"])));
        assert_eq!(config.to_string(), "VotingConfiguration{a}");
    }
}
