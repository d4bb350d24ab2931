//! Error types for voting configuration coordination

use keystone_cluster_state::ClusterStateError;
use keystone_topology::TopologyError;
use thiserror::Error;

/// Result type for coordination operations
pub type CoordinationResult<T> = Result<T, CoordinationError>;

/// Errors returned by the voting exclusions coordinator
#[derive(Debug, Error)]
pub enum CoordinationError {
    /// The request is malformed or its targets resolved to nothing
    #[error("{0}")]
    Validation(String),

    /// Adding the exclusions would exceed the configured maximum
    #[error("{0}")]
    CapacityExceeded(String),

    /// The change did not take effect before the deadline
    #[error("{0}")]
    Timeout(String),

    /// The cluster service shut down while waiting
    #[error("cluster service closed while waiting for {0}")]
    ServiceUnavailable(String),

    /// A state-update task failed
    #[error(transparent)]
    StateUpdate(#[from] ClusterStateError),
}

impl From<TopologyError> for CoordinationError {
    fn from(error: TopologyError) -> Self {
        Self::Validation(error.to_string())
    }
}
