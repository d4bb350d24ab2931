//! Error types for shard allocation

use keystone_cluster_state::ClusterStateError;
use thiserror::Error;

/// Allocation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// Two deciders of the same implementation type were registered
    #[error("cannot specify allocation decider [{0}] twice")]
    DuplicateDecider(&'static str),

    /// Two shards allocators were registered under the same name
    #[error("shards allocator [{0}] is already registered")]
    DuplicateAllocator(String),

    /// The configured shards allocator is not registered
    #[error("unknown shards allocator [{0}]")]
    UnknownAllocator(String),

    /// A shard copy that is not part of the routing table
    #[error("unknown shard {0}")]
    UnknownShard(String),

    /// Cluster state handling failed
    #[error(transparent)]
    ClusterState(#[from] ClusterStateError),
}

/// Result type for allocation operations
pub type AllocationResult<T> = Result<T, AllocationError>;
