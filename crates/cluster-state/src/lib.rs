//! Cluster state model for Keystone
//!
//! This crate provides:
//! - Immutable cluster state snapshots (`ClusterState`) and their parts:
//!   voting configuration, index metadata, the shard routing table and
//!   snapshot/restore progress
//! - The `ClusterService` trait abstracting the commit primitive
//! - `ClusterStateObserver` for waiting on conditions over published states
//! - Dynamic cluster settings (`ClusterSettings`)
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod coordination;
pub mod error;
pub mod filters;
pub mod in_progress;
pub mod metadata;
pub mod observer;
pub mod routing;
pub mod service;
pub mod settings;
pub mod state;

pub use coordination::{
    CoordinationMetadata, CoordinationMetadataBuilder, MISSING_VALUE_MARKER, VotingConfigExclusion,
    VotingConfiguration, format_exclusions,
};
pub use error::{ClusterStateError, ClusterStateResult};
pub use filters::{AllocationFilters, NodeFilter};
pub use in_progress::{
    RestoreEntry, RestoreInProgress, ShardOperationState, SnapshotEntry, SnapshotShard,
    SnapshotsInProgress,
};
pub use metadata::{IndexMetadata, IndexSettings, Metadata};
pub use observer::{ClusterStateObserver, ObservedState, ObserverListener};
pub use routing::{
    RecoverySource, RoutingTable, ShardId, ShardRouting, ShardRoutingState, UnassignedInfo,
    UnassignedReason,
};
pub use service::{ClusterService, StateReconciler, StateUpdateTask};
pub use settings::{
    AllocationSettings, AllowRebalance, ClusterSettings, CoordinationSettings, EnableAllocation,
    EnableRebalance, Settings, SettingsBuilder,
};
pub use state::{ClusterState, ClusterStateBuilder};
