//! Error types for cluster state handling

use keystone_topology::TopologyError;
use thiserror::Error;

/// Cluster state errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterStateError {
    /// A state-update task rejected the state it was applied to
    #[error("failed to execute cluster state update task [{task}]: {reason}")]
    TaskFailed {
        /// Source label of the task
        task: String,
        /// Why the task failed
        reason: String,
    },

    /// The cluster service was shut down
    #[error("cluster service is closed")]
    ServiceClosed,

    /// A settings key that isn't registered
    #[error("unknown setting [{0}]")]
    UnknownSetting(String),

    /// A settings value that couldn't be parsed or is out of range
    #[error("failed to parse value [{value}] for setting [{key}]: {reason}")]
    InvalidSetting {
        /// The setting key
        key: String,
        /// The rejected value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// A node directory could not be built
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),
}

impl ClusterStateError {
    /// Convenience constructor for task failures
    pub fn task_failed(task: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TaskFailed {
            task: task.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for cluster state operations
pub type ClusterStateResult<T> = Result<T, ClusterStateError>;
