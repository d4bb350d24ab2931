//! Resolution of free-form node descriptors against a node directory
//!
//! A descriptor is one of:
//! - `_all`: every node
//! - `_local`: the node executing the request
//! - `_master`: the elected master
//! - an exact node id, or a node name (which may contain `*` wildcards)
//! - `attr:value`: nodes carrying that attribute; `master`, `data` and
//!   `ingest` are synthetic attributes mapping to role membership
//!   (`master:true`, `data:false`, ...)
//!
//! Matches of all descriptors are unioned.

use std::collections::BTreeSet;

use tracing::debug;

use crate::pattern::simple_match;
use crate::{Node, NodeId, NodeRole, Nodes, TopologyError};

/// Descriptor matching every node
pub const ALL_NODES: &str = "_all";

/// Descriptor matching the local node
pub const LOCAL_NODE: &str = "_local";

/// Descriptor matching the elected master
pub const MASTER_NODE: &str = "_master";

/// Resolves node descriptors against one directory snapshot
#[derive(Debug, Clone, Copy)]
pub struct NodeDescriptionMatcher<'a> {
    nodes: &'a Nodes,
}

impl<'a> NodeDescriptionMatcher<'a> {
    /// Create a matcher over a directory snapshot
    #[must_use]
    pub const fn new(nodes: &'a Nodes) -> Self {
        Self { nodes }
    }

    /// Resolve descriptors to the ids of every matching node.
    ///
    /// An empty descriptor list matches every node.
    pub fn resolve<S: AsRef<str>>(&self, descriptions: &[S]) -> BTreeSet<NodeId> {
        if descriptions.is_empty() {
            return self.nodes.node_ids().cloned().collect();
        }

        let mut resolved = BTreeSet::new();
        for description in descriptions {
            self.resolve_one(description.as_ref(), &mut resolved);
        }
        resolved
    }

    /// Resolve descriptors to the matching master-eligible nodes.
    ///
    /// Descriptors that match only nodes which can't vote contribute nothing.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::NoMasterEligibleMatch`], naming the original
    /// descriptors, when nothing master-eligible matched.
    pub fn resolve_master_eligible<S: AsRef<str>>(
        &self,
        descriptions: &[S],
    ) -> Result<Vec<&'a Node>, TopologyError> {
        let nodes: &'a Nodes = self.nodes;
        let matched: Vec<&'a Node> = self
            .resolve(descriptions)
            .iter()
            .filter_map(|id| nodes.get(id.as_str()))
            .filter(|node| node.is_master_eligible())
            .collect();

        if matched.is_empty() {
            return Err(TopologyError::NoMasterEligibleMatch {
                descriptions: descriptions.iter().map(|d| d.as_ref().to_string()).collect(),
            });
        }

        debug!(
            "Resolved {} descriptors to {} master-eligible nodes",
            descriptions.len(),
            matched.len()
        );
        Ok(matched)
    }

    fn resolve_one(&self, description: &str, resolved: &mut BTreeSet<NodeId>) {
        match description {
            ALL_NODES => {
                resolved.extend(self.nodes.node_ids().cloned());
                return;
            }
            LOCAL_NODE => {
                resolved.extend(self.nodes.local_node_id().cloned());
                return;
            }
            MASTER_NODE => {
                resolved.extend(self.nodes.master_node_id().cloned());
                return;
            }
            _ => {}
        }

        if self.nodes.contains(description) {
            resolved.insert(NodeId::new(description));
            return;
        }

        resolved.extend(
            self.nodes
                .iter()
                .filter(|node| simple_match(description, node.name()))
                .map(|node| node.id().clone()),
        );

        if let Some((attr, value)) = description.split_once(':') {
            match attr.parse::<NodeRole>() {
                Ok(role) => {
                    let wanted = match value {
                        "true" => true,
                        "false" => false,
                        _ => return,
                    };
                    resolved.extend(
                        self.nodes
                            .iter()
                            .filter(|node| node.has_role(role) == wanted)
                            .map(|node| node.id().clone()),
                    );
                }
                Err(_) => {
                    resolved.extend(
                        self.nodes
                            .iter()
                            .filter(|node| {
                                node.attributes()
                                    .iter()
                                    .any(|(k, v)| simple_match(attr, k) && simple_match(value, v))
                            })
                            .map(|node| node.id().clone()),
                    );
                }
            }
        }
    }
}
