//! Attribute filters restricting which nodes may hold shards

use std::collections::BTreeMap;
use std::fmt;

use keystone_topology::Node;
use keystone_topology::pattern::simple_match;
use serde::{Deserialize, Serialize};

/// Pseudo attribute matching the node id
pub const ID_ATTRIBUTE: &str = "_id";
/// Pseudo attribute matching the node name
pub const NAME_ATTRIBUTE: &str = "_name";

/// A set of `attribute -> patterns` rules.
///
/// Values are parsed from comma separated lists; each pattern may use `*`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFilter {
    rules: BTreeMap<String, Vec<String>>,
}

impl NodeFilter {
    /// Whether the filter has no rules
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Set the patterns for one attribute from a comma separated list.
    ///
    /// An empty list removes the rule.
    pub fn set(&mut self, attribute: impl Into<String>, values: &str) {
        let attribute = attribute.into();
        let patterns: Vec<String> = values
            .split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect();
        if patterns.is_empty() {
            self.rules.remove(&attribute);
        } else {
            self.rules.insert(attribute, patterns);
        }
    }

    /// Builder flavour of [`NodeFilter::set`]
    #[must_use]
    pub fn with(mut self, attribute: impl Into<String>, values: &str) -> Self {
        self.set(attribute, values);
        self
    }

    /// Rules as `(attribute, patterns)` pairs
    pub fn rules(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.rules
            .iter()
            .map(|(attribute, patterns)| (attribute.as_str(), patterns.as_slice()))
    }

    /// Every rule is satisfied by the node
    #[must_use]
    pub fn matches_all(&self, node: &Node) -> bool {
        self.rules
            .iter()
            .all(|(attribute, patterns)| rule_matches(node, attribute, patterns))
    }

    /// At least one rule is satisfied by the node
    #[must_use]
    pub fn matches_any(&self, node: &Node) -> bool {
        self.rules
            .iter()
            .any(|(attribute, patterns)| rule_matches(node, attribute, patterns))
    }
}

impl fmt::Display for NodeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (attribute, patterns)) in self.rules.iter().enumerate() {
            if i > 0 {
                f.write_str(" OR ")?;
            }
            write!(f, "{attribute}:\"{}\"", patterns.join(","))?;
        }
        Ok(())
    }
}

fn rule_matches(node: &Node, attribute: &str, patterns: &[String]) -> bool {
    let value = match attribute {
        ID_ATTRIBUTE => Some(node.id().as_str()),
        NAME_ATTRIBUTE => Some(node.name()),
        custom => node.attribute(custom),
    };
    value.is_some_and(|value| patterns.iter().any(|pattern| simple_match(pattern, value)))
}

/// `require`, `include` and `exclude` filters at one level (cluster or index)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationFilters {
    /// Nodes must match every rule
    pub require: NodeFilter,
    /// Nodes must match at least one rule
    pub include: NodeFilter,
    /// Nodes must match no rule
    pub exclude: NodeFilter,
}

impl AllocationFilters {
    /// Whether no filter is configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.require.is_empty() && self.include.is_empty() && self.exclude.is_empty()
    }
}
