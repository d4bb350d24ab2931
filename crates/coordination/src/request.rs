//! Requests handled by the voting exclusions coordinator

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use keystone_cluster_state::{ClusterState, VotingConfigExclusion};
use keystone_topology::NodeDescriptionMatcher;
use tracing::warn;

use crate::error::{CoordinationError, CoordinationResult};

/// Default time to wait for an exclusion change to take effect
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const INVALID_IDENTIFIERS: &str = "Please set node identifiers correctly. One and only one of [node_name], [node_names] and [node_ids] has to be set";

/// A request to the coordinator
pub trait CoordinationRequest {
    /// Name of the request type, also used as the state-update task source
    fn request_type() -> &'static str;

    /// Timeout applied when the caller doesn't pick one
    fn default_timeout() -> Duration {
        DEFAULT_TIMEOUT
    }
}

/// Withdraw nodes from the voting configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddVotingConfigExclusionsRequest {
    /// Free-form node descriptors (deprecated)
    pub node_descriptions: Vec<String>,
    /// Node ids, taken at face value
    pub node_ids: Vec<String>,
    /// Node names, taken at face value
    pub node_names: Vec<String>,
    /// How long to wait for the exclusions to take effect (default: 30s)
    pub timeout: Duration,
}

impl AddVotingConfigExclusionsRequest {
    /// Target nodes matched by descriptors such as `other*` or `master:true`
    pub fn from_node_descriptions<S: Into<String>>(
        descriptions: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            node_descriptions: descriptions.into_iter().map(Into::into).collect(),
            node_ids: Vec::new(),
            node_names: Vec::new(),
            timeout: Self::default_timeout(),
        }
    }

    /// Target nodes by id
    pub fn from_node_ids<S: Into<String>>(ids: impl IntoIterator<Item = S>) -> Self {
        Self {
            node_descriptions: Vec::new(),
            node_ids: ids.into_iter().map(Into::into).collect(),
            node_names: Vec::new(),
            timeout: Self::default_timeout(),
        }
    }

    /// Target nodes by name
    pub fn from_node_names<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            node_descriptions: Vec::new(),
            node_ids: Vec::new(),
            node_names: names.into_iter().map(Into::into).collect(),
            timeout: Self::default_timeout(),
        }
    }

    /// Override the timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check that exactly one non-empty list of targets is set.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::Validation`] otherwise.
    pub fn validate(&self) -> CoordinationResult<()> {
        let set = [
            !self.node_descriptions.is_empty(),
            !self.node_ids.is_empty(),
            !self.node_names.is_empty(),
        ];
        if set.iter().filter(|set| **set).count() == 1 {
            Ok(())
        } else {
            Err(CoordinationError::Validation(INVALID_IDENTIFIERS.to_string()))
        }
    }

    /// Log a deprecation warning if the request uses descriptors
    pub fn warn_if_deprecated(&self) {
        if !self.node_descriptions.is_empty() {
            warn!(
                target: "deprecation",
                "nodeDescriptions for voting config exclusions is deprecated, use node_ids or node_names instead: {:?}",
                self.node_descriptions
            );
        }
    }

    /// Resolve the targets against `state`.
    ///
    /// Ids and names are taken at face value: a present master-eligible node
    /// yields a full exclusion. An absent one reuses the stored exclusion with
    /// that id or name, or else becomes a placeholder. Present nodes that
    /// can't vote are skipped. Descriptors resolve through the matcher
    /// and must match at least one master-eligible node.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::Validation`] if the request is malformed
    /// or its descriptors match no master-eligible node.
    pub fn resolve(
        &self,
        state: &ClusterState,
    ) -> CoordinationResult<BTreeSet<VotingConfigExclusion>> {
        self.validate()?;
        let nodes = state.nodes();
        let existing = state.coordination().voting_config_exclusions();

        if !self.node_descriptions.is_empty() {
            let matched = NodeDescriptionMatcher::new(nodes)
                .resolve_master_eligible(&self.node_descriptions)?;
            return Ok(matched
                .into_iter()
                .map(VotingConfigExclusion::from_node)
                .collect());
        }

        let mut resolved = BTreeSet::new();
        for id in &self.node_ids {
            match nodes.get(id) {
                Some(node) if node.is_master_eligible() => {
                    resolved.insert(VotingConfigExclusion::from_node(node));
                }
                Some(_) => {}
                None => {
                    let exclusion = existing
                        .iter()
                        .find(|exclusion| {
                            exclusion.node_id().is_some_and(|known| known.as_str() == id)
                        })
                        .cloned()
                        .unwrap_or_else(|| VotingConfigExclusion::from_node_id(id.as_str()));
                    resolved.insert(exclusion);
                }
            }
        }
        for name in &self.node_names {
            match nodes.get_by_name(name) {
                Some(node) if node.is_master_eligible() => {
                    resolved.insert(VotingConfigExclusion::from_node(node));
                }
                Some(_) => {}
                None => {
                    let exclusion = existing
                        .iter()
                        .find(|exclusion| exclusion.node_name() == Some(name.as_str()))
                        .cloned()
                        .unwrap_or_else(|| VotingConfigExclusion::from_node_name(name.as_str()));
                    resolved.insert(exclusion);
                }
            }
        }
        Ok(resolved)
    }
}

impl CoordinationRequest for AddVotingConfigExclusionsRequest {
    fn request_type() -> &'static str {
        "add-voting-config-exclusions"
    }
}

impl fmt::Display for AddVotingConfigExclusionsRequest {
    /// Renders the targets, as used in error messages
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.node_descriptions.is_empty() {
            write!(f, "[{}]", self.node_descriptions.join(", "))
        } else if !self.node_ids.is_empty() {
            write!(f, "nodes with ids [{}]", self.node_ids.join(", "))
        } else {
            write!(f, "nodes named [{}]", self.node_names.join(", "))
        }
    }
}

/// Remove every voting config exclusion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearVotingConfigExclusionsRequest {
    /// Wait for the excluded nodes to leave the cluster first (default: true)
    pub wait_for_removal: bool,
    /// How long to wait for the nodes to leave (default: 30s)
    pub timeout: Duration,
}

impl ClearVotingConfigExclusionsRequest {
    /// Don't wait for the excluded nodes to leave
    #[must_use]
    pub const fn without_waiting(mut self) -> Self {
        self.wait_for_removal = false;
        self
    }

    /// Override the timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ClearVotingConfigExclusionsRequest {
    fn default() -> Self {
        Self {
            wait_for_removal: true,
            timeout: Self::default_timeout(),
        }
    }
}

impl CoordinationRequest for ClearVotingConfigExclusionsRequest {
    fn request_type() -> &'static str {
        "clear-voting-config-exclusions"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use keystone_topology::{Node, NodeRole, Nodes};

    fn state() -> ClusterState {
        let nodes = Nodes::builder()
            .add(Node::builder("n1", "node1").role(NodeRole::Master).build())
            .add(Node::builder("o1", "other1").role(NodeRole::Master).build())
            .add(Node::builder("o2", "other2").role(NodeRole::Master).build())
            .add(Node::builder("d1", "data1").role(NodeRole::Data).build())
            .build()
            .unwrap();
        ClusterState::builder().nodes(nodes).build()
    }

    fn rendered(exclusions: &BTreeSet<VotingConfigExclusion>) -> Vec<String> {
        exclusions.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_validate() {
        assert!(AddVotingConfigExclusionsRequest::from_node_ids(["a"]).validate().is_ok());
        assert_matches!(
            AddVotingConfigExclusionsRequest::from_node_ids(Vec::<String>::new()).validate(),
            Err(CoordinationError::Validation(message)) if message.contains("One and only one of")
        );

        let mut mixed = AddVotingConfigExclusionsRequest::from_node_ids(["a"]);
        mixed.node_names.push("b".to_string());
        assert_matches!(mixed.validate(), Err(CoordinationError::Validation(_)));
    }

    #[test]
    fn test_resolve_ids_and_placeholders() {
        let request = AddVotingConfigExclusionsRequest::from_node_ids(["o1", "absent_id", "d1"]);
        let resolved = request.resolve(&state()).unwrap();
        assert_eq!(rendered(&resolved), vec!["{absent_id}{_absent_}", "{o1}{other1}"]);

        let request = AddVotingConfigExclusionsRequest::from_node_names(["other2", "absent_node"]);
        let resolved = request.resolve(&state()).unwrap();
        assert_eq!(rendered(&resolved), vec!["{_absent_}{absent_node}", "{o2}{other2}"]);
    }

    #[test]
    fn test_departed_nodes_reuse_stored_exclusions() {
        let departed = Node::builder("o2", "other2").role(NodeRole::Master).build();
        let state = state();
        let coordination = state
            .coordination()
            .to_builder()
            .add_voting_config_exclusion(VotingConfigExclusion::from_node(&departed))
            .build();
        let state = state
            .to_builder()
            .nodes(state.nodes().without_node("o2"))
            .coordination(coordination)
            .build();

        let by_id = AddVotingConfigExclusionsRequest::from_node_ids(["o2"]);
        assert_eq!(rendered(&by_id.resolve(&state).unwrap()), vec!["{o2}{other2}"]);
        let by_name = AddVotingConfigExclusionsRequest::from_node_names(["other2"]);
        assert_eq!(rendered(&by_name.resolve(&state).unwrap()), vec!["{o2}{other2}"]);
    }

    #[test]
    fn test_resolve_descriptors() {
        let request = AddVotingConfigExclusionsRequest::from_node_descriptions(["other*"]);
        let resolved = request.resolve(&state()).unwrap();
        assert_eq!(rendered(&resolved), vec!["{o1}{other1}", "{o2}{other2}"]);

        let request = AddVotingConfigExclusionsRequest::from_node_descriptions(["_all"]);
        assert_eq!(request.resolve(&state()).unwrap().len(), 3);

        let request = AddVotingConfigExclusionsRequest::from_node_descriptions(["not-a-node"]);
        assert_matches!(
            request.resolve(&state()),
            Err(CoordinationError::Validation(message))
                if message.contains("matched no master-eligible nodes")
        );
    }

    #[test]
    fn test_target_rendering() {
        assert_eq!(
            AddVotingConfigExclusionsRequest::from_node_descriptions(["other*"]).to_string(),
            "[other*]"
        );
        assert_eq!(
            AddVotingConfigExclusionsRequest::from_node_ids(["a", "b"]).to_string(),
            "nodes with ids [a, b]"
        );
        assert_eq!(
            AddVotingConfigExclusionsRequest::from_node_names(["x"]).to_string(),
            "nodes named [x]"
        );
    }

    #[test]
    fn test_defaults() {
        let clear = ClearVotingConfigExclusionsRequest::default();
        assert!(clear.wait_for_removal);
        assert_eq!(clear.timeout, Duration::from_secs(30));
        assert!(!clear.without_waiting().wait_for_removal);
        assert_eq!(
            AddVotingConfigExclusionsRequest::from_node_ids(["a"]).timeout,
            Duration::from_secs(30)
        );
    }
}
