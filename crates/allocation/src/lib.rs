//! Shard allocation for Keystone
//!
//! This crate provides:
//! - The ordered allocation decider chain and its registry
//! - Pluggable shards allocators, with the weight based balanced allocator
//!   as default
//! - `AllocationService`, which reroutes cluster states and runs as the
//!   cluster service's `StateReconciler`
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod allocator;
pub mod cluster_info;
pub mod decider;
pub mod decision;
pub mod error;
pub mod routing_allocation;
pub mod service;

pub use allocator::{AllocatorRegistry, BalancedShardsAllocator, ShardsAllocator};
pub use cluster_info::{ClusterInfo, ClusterInfoProvider, DiskUsage, SharedClusterInfo};
pub use decider::{AllocationDecider, AllocationDeciders, DeciderRegistry};
pub use decision::{Decision, Outcome};
pub use error::{AllocationError, AllocationResult};
pub use routing_allocation::RoutingAllocation;
pub use service::{AllocationExplanation, AllocationService, NodeDecision};
