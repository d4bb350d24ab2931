//! Simple error types for topology operations

use thiserror::Error as ThisError;

/// Topology-related errors
#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum TopologyError {
    /// A set of node descriptions resolved to no master-eligible node
    #[error("[{}] matched no master-eligible nodes", descriptions.join(", "))]
    NoMasterEligibleMatch {
        /// The original descriptions, as supplied by the caller
        descriptions: Vec<String>,
    },

    /// A node was added twice to the same directory
    #[error("duplicate node id [{0}]")]
    DuplicateNode(String),

    /// The local or master node id is not part of the directory
    #[error("node [{0}] is not part of the directory")]
    UnknownNode(String),

    /// A role name could not be parsed
    #[error("unknown node role [{0}]")]
    UnknownRole(String),
}
