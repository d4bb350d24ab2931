//! Disk usage and shard size information
//!
//! Cluster info is gathered outside of the cluster state and handed to each
//! reroute by a [`ClusterInfoProvider`].

use std::collections::BTreeMap;
use std::sync::Arc;

use keystone_cluster_state::ShardId;
use keystone_topology::NodeId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Disk usage of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskUsage {
    /// Total capacity in bytes
    pub total_bytes: u64,
    /// Free space in bytes
    pub free_bytes: u64,
}

impl DiskUsage {
    /// Create a disk usage record
    #[must_use]
    pub const fn new(total_bytes: u64, free_bytes: u64) -> Self {
        Self {
            total_bytes,
            free_bytes,
        }
    }

    /// Bytes in use
    #[must_use]
    pub const fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.free_bytes)
    }

    /// Percentage of the disk in use, after adding `extra_bytes`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn used_percent_with(&self, extra_bytes: u64) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        (self.used_bytes().saturating_add(extra_bytes)) as f64 * 100.0 / self.total_bytes as f64
    }

    /// Percentage of the disk in use
    #[must_use]
    pub fn used_percent(&self) -> f64 {
        self.used_percent_with(0)
    }
}

/// Disk usage per node and estimated size per shard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    disk_usages: BTreeMap<NodeId, DiskUsage>,
    shard_sizes: BTreeMap<ShardId, u64>,
}

impl ClusterInfo {
    /// Empty info
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node's disk usage
    #[must_use]
    pub fn with_disk_usage(mut self, node_id: impl Into<NodeId>, usage: DiskUsage) -> Self {
        self.disk_usages.insert(node_id.into(), usage);
        self
    }

    /// Record a shard's size
    #[must_use]
    pub fn with_shard_size(mut self, shard_id: ShardId, bytes: u64) -> Self {
        self.shard_sizes.insert(shard_id, bytes);
        self
    }

    /// Disk usage of a node, if known
    #[must_use]
    pub fn disk_usage(&self, node_id: &str) -> Option<&DiskUsage> {
        self.disk_usages.get(node_id)
    }

    /// Size of a shard, if known
    #[must_use]
    pub fn shard_size(&self, shard_id: &ShardId) -> Option<u64> {
        self.shard_sizes.get(shard_id).copied()
    }
}

/// Source of cluster info for reroutes
pub trait ClusterInfoProvider: Send + Sync + 'static {
    /// Latest known cluster info
    fn cluster_info(&self) -> ClusterInfo;
}

/// A cluster info provider whose contents are set by the caller
#[derive(Debug, Clone, Default)]
pub struct SharedClusterInfo {
    info: Arc<RwLock<ClusterInfo>>,
}

impl SharedClusterInfo {
    /// Create a provider holding `info`
    #[must_use]
    pub fn new(info: ClusterInfo) -> Self {
        Self {
            info: Arc::new(RwLock::new(info)),
        }
    }

    /// Replace the info
    pub fn set(&self, info: ClusterInfo) {
        *self.info.write() = info;
    }
}

impl ClusterInfoProvider for SharedClusterInfo {
    fn cluster_info(&self) -> ClusterInfo {
        self.info.read().clone()
    }
}
