//! Snapshot and restore operations in flight
//!
//! These are written by the snapshot subsystem; allocation only reads them to
//! avoid moving shards that are being snapshotted and to stop allocating
//! shards whose restore has failed.

use std::collections::BTreeMap;

use keystone_topology::NodeId;
use serde::{Deserialize, Serialize};

use crate::routing::ShardId;

/// Progress of a single shard within a snapshot or restore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShardOperationState {
    /// Still running
    Init,
    /// Finished successfully
    Success,
    /// Finished with a failure
    Failure,
}

impl ShardOperationState {
    /// Whether the operation reached a terminal state
    #[must_use]
    pub const fn completed(self) -> bool {
        !matches!(self, Self::Init)
    }
}

/// A shard being snapshotted on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotShard {
    /// Node the shard data is read from
    pub node_id: NodeId,
    /// Progress
    pub state: ShardOperationState,
}

/// One running snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Snapshot name
    pub snapshot: String,
    /// Shards included in the snapshot
    pub shards: BTreeMap<ShardId, SnapshotShard>,
}

/// All running snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotsInProgress {
    entries: Vec<SnapshotEntry>,
}

impl SnapshotsInProgress {
    /// Create from running snapshots
    #[must_use]
    pub const fn new(entries: Vec<SnapshotEntry>) -> Self {
        Self { entries }
    }

    /// Running snapshots
    #[must_use]
    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    /// Name of a snapshot currently reading `shard_id` from `node_id`
    #[must_use]
    pub fn snapshotting(&self, shard_id: &ShardId, node_id: &str) -> Option<&str> {
        self.entries.iter().find_map(|entry| {
            entry
                .shards
                .get(shard_id)
                .filter(|shard| !shard.state.completed() && shard.node_id.as_str() == node_id)
                .map(|_| entry.snapshot.as_str())
        })
    }
}

/// One running restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreEntry {
    /// Snapshot being restored
    pub snapshot: String,
    /// Per-shard progress
    pub shards: BTreeMap<ShardId, ShardOperationState>,
}

/// All running restores, keyed by restore uuid
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreInProgress {
    entries: BTreeMap<String, RestoreEntry>,
}

impl RestoreInProgress {
    /// Create from running restores
    #[must_use]
    pub const fn new(entries: BTreeMap<String, RestoreEntry>) -> Self {
        Self { entries }
    }

    /// Look up a restore
    #[must_use]
    pub fn get(&self, restore_uuid: &str) -> Option<&RestoreEntry> {
        self.entries.get(restore_uuid)
    }

    /// Progress of `shard_id` in the restore `restore_uuid`
    #[must_use]
    pub fn shard_state(
        &self,
        restore_uuid: &str,
        shard_id: &ShardId,
    ) -> Option<ShardOperationState> {
        self.get(restore_uuid)
            .and_then(|entry| entry.shards.get(shard_id))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshotting_ignores_completed_shards() {
        let shard_id = ShardId::new("logs", 0);
        let mut shards = BTreeMap::new();
        shards.insert(
            shard_id.clone(),
            SnapshotShard {
                node_id: NodeId::new("a"),
                state: ShardOperationState::Init,
            },
        );
        let running = SnapshotsInProgress::new(vec![SnapshotEntry {
            snapshot: "nightly".to_string(),
            shards: shards.clone(),
        }]);
        assert_eq!(running.snapshotting(&shard_id, "a"), Some("nightly"));
        assert_eq!(running.snapshotting(&shard_id, "b"), None);

        shards.get_mut(&shard_id).unwrap().state = ShardOperationState::Success;
        let done = SnapshotsInProgress::new(vec![SnapshotEntry {
            snapshot: "nightly".to_string(),
            shards,
        }]);
        assert_eq!(done.snapshotting(&shard_id, "a"), None);
    }
}
