//! Shard routing table
//!
//! Every shard of every index has one primary copy and a configurable number
//! of replica copies. Each copy is tracked as a [`ShardRouting`], which moves
//! through `UNASSIGNED → INITIALIZING → STARTED (→ RELOCATING → STARTED)`.
//! Routing values are immutable; transitions return the next value.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use keystone_topology::NodeId;
use serde::{Deserialize, Serialize};

use crate::IndexMetadata;

/// Identity of one shard of an index
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardId {
    index: String,
    id: u32,
}

impl ShardId {
    /// Create a shard id
    pub fn new(index: impl Into<String>, id: u32) -> Self {
        Self {
            index: index.into(),
            id,
        }
    }

    /// Name of the index owning this shard
    #[must_use]
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Shard number within the index
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{}]", self.index, self.id)
    }
}

/// Lifecycle state of a shard copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShardRoutingState {
    /// Not allocated to any node
    Unassigned,
    /// Allocated to a node and recovering
    Initializing,
    /// Active on a node
    Started,
    /// Active on a node and being copied to another one
    Relocating,
}

impl fmt::Display for ShardRoutingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unassigned => "UNASSIGNED",
            Self::Initializing => "INITIALIZING",
            Self::Started => "STARTED",
            Self::Relocating => "RELOCATING",
        };
        f.write_str(name)
    }
}

/// Where an initializing copy gets its data from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoverySource {
    /// A brand new, empty primary
    EmptyStore,
    /// A primary reusing data already on the node's disk
    ExistingStore,
    /// A replica copying from its primary
    Peer,
    /// A primary restored from a snapshot
    Snapshot {
        /// The restore operation this copy belongs to
        restore_uuid: String,
        /// The snapshot being restored
        snapshot: String,
    },
    /// A resize target built from local copies of the source index
    LocalShards,
}

/// Why a copy is unassigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnassignedReason {
    /// The index was just created
    IndexCreated,
    /// The index is being restored from a snapshot
    NewIndexRestored,
    /// The node holding the copy left the cluster
    NodeLeft,
    /// Recovering or running the copy failed
    AllocationFailed,
    /// The primary failed and this copy was reset
    PrimaryFailed,
}

/// Details about why and for how long a copy has been unassigned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnassignedInfo {
    reason: UnassignedReason,
    failed_allocations: u32,
    message: Option<String>,
}

impl UnassignedInfo {
    /// Fresh info with no failures
    #[must_use]
    pub const fn new(reason: UnassignedReason) -> Self {
        Self {
            reason,
            failed_allocations: 0,
            message: None,
        }
    }

    /// Info for an allocation failure, counting on top of previous failures
    pub fn failed(previous: Option<&Self>, message: impl Into<String>) -> Self {
        Self {
            reason: UnassignedReason::AllocationFailed,
            failed_allocations: previous.map_or(0, |info| info.failed_allocations) + 1,
            message: Some(message.into()),
        }
    }

    /// Why the copy is unassigned
    #[must_use]
    pub const fn reason(&self) -> UnassignedReason {
        self.reason
    }

    /// Consecutive failed allocation attempts
    #[must_use]
    pub const fn failed_allocations(&self) -> u32 {
        self.failed_allocations
    }

    /// Details of the last failure
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// One copy of a shard and where it lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRouting {
    shard_id: ShardId,
    copy: u32,
    primary: bool,
    state: ShardRoutingState,
    current_node: Option<NodeId>,
    relocating_node: Option<NodeId>,
    recovery_source: Option<RecoverySource>,
    unassigned_info: Option<UnassignedInfo>,
}

impl ShardRouting {
    /// A new unassigned copy.
    ///
    /// `copy` identifies the copy within its shard and never changes, even if
    /// the copy is later promoted to primary.
    #[must_use]
    pub const fn new_unassigned(
        shard_id: ShardId,
        copy: u32,
        primary: bool,
        recovery_source: RecoverySource,
        unassigned_info: UnassignedInfo,
    ) -> Self {
        Self {
            shard_id,
            copy,
            primary,
            state: ShardRoutingState::Unassigned,
            current_node: None,
            relocating_node: None,
            recovery_source: Some(recovery_source),
            unassigned_info: Some(unassigned_info),
        }
    }

    /// The shard this copy belongs to
    #[must_use]
    pub const fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    /// Stable copy number within the shard
    #[must_use]
    pub const fn copy(&self) -> u32 {
        self.copy
    }

    /// Whether this copy is the primary
    #[must_use]
    pub const fn primary(&self) -> bool {
        self.primary
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> ShardRoutingState {
        self.state
    }

    /// Node holding the copy, if assigned
    #[must_use]
    pub const fn current_node(&self) -> Option<&NodeId> {
        self.current_node.as_ref()
    }

    /// Target node of an in-flight relocation
    #[must_use]
    pub const fn relocating_node(&self) -> Option<&NodeId> {
        self.relocating_node.as_ref()
    }

    /// Where the copy recovers from while unassigned or initializing
    #[must_use]
    pub const fn recovery_source(&self) -> Option<&RecoverySource> {
        self.recovery_source.as_ref()
    }

    /// Why the copy is (or was last) unassigned
    #[must_use]
    pub const fn unassigned_info(&self) -> Option<&UnassignedInfo> {
        self.unassigned_info.as_ref()
    }

    /// Whether the copy is unassigned
    #[must_use]
    pub const fn unassigned(&self) -> bool {
        matches!(self.state, ShardRoutingState::Unassigned)
    }

    /// Whether the copy is initializing
    #[must_use]
    pub const fn initializing(&self) -> bool {
        matches!(self.state, ShardRoutingState::Initializing)
    }

    /// Whether the copy is started and not moving
    #[must_use]
    pub const fn started(&self) -> bool {
        matches!(self.state, ShardRoutingState::Started)
    }

    /// Whether the copy is relocating
    #[must_use]
    pub const fn relocating(&self) -> bool {
        matches!(self.state, ShardRoutingState::Relocating)
    }

    /// Whether the copy serves requests (started or relocating)
    #[must_use]
    pub const fn active(&self) -> bool {
        matches!(
            self.state,
            ShardRoutingState::Started | ShardRoutingState::Relocating
        )
    }

    /// Whether the copy is assigned to a node
    #[must_use]
    pub const fn assigned_to_node(&self) -> bool {
        self.current_node.is_some()
    }

    /// Whether `other` is the same copy (same shard and copy number)
    #[must_use]
    pub fn is_same_copy(&self, other: &Self) -> bool {
        self.shard_id == other.shard_id && self.copy == other.copy
    }

    /// Assign an unassigned copy to `node`
    #[must_use]
    pub fn initialize(&self, node: NodeId) -> Self {
        debug_assert!(self.unassigned(), "only unassigned copies can initialize");
        Self {
            state: ShardRoutingState::Initializing,
            current_node: Some(node),
            relocating_node: None,
            ..self.clone()
        }
    }

    /// Mark the copy started.
    ///
    /// A relocating copy completes its move and becomes started on the
    /// target node.
    #[must_use]
    pub fn start(&self) -> Self {
        let current_node = match self.state {
            ShardRoutingState::Relocating => self.relocating_node.clone(),
            _ => self.current_node.clone(),
        };
        Self {
            state: ShardRoutingState::Started,
            current_node,
            relocating_node: None,
            recovery_source: None,
            unassigned_info: None,
            ..self.clone()
        }
    }

    /// Start moving an active copy to `target`
    #[must_use]
    pub fn relocate(&self, target: NodeId) -> Self {
        debug_assert!(self.started(), "only started copies can relocate");
        Self {
            state: ShardRoutingState::Relocating,
            relocating_node: Some(target),
            ..self.clone()
        }
    }

    /// Abort an in-flight relocation, leaving the copy started where it was
    #[must_use]
    pub fn cancel_relocation(&self) -> Self {
        Self {
            state: ShardRoutingState::Started,
            relocating_node: None,
            ..self.clone()
        }
    }

    /// Unassign the copy after a failure, counting the failed attempt
    #[must_use]
    pub fn fail(&self, message: impl Into<String>) -> Self {
        self.unassign(UnassignedInfo::failed(self.unassigned_info.as_ref(), message))
    }

    /// Unassign the copy because its node left
    #[must_use]
    pub fn node_left(&self) -> Self {
        let info = UnassignedInfo {
            reason: UnassignedReason::NodeLeft,
            failed_allocations: self
                .unassigned_info
                .as_ref()
                .map_or(0, UnassignedInfo::failed_allocations),
            message: None,
        };
        self.unassign(info)
    }

    /// Turn an active replica into the primary
    #[must_use]
    pub fn promote_to_primary(&self) -> Self {
        Self {
            primary: true,
            ..self.clone()
        }
    }

    /// Turn the copy into a replica
    #[must_use]
    pub fn demote_to_replica(&self) -> Self {
        Self {
            primary: false,
            recovery_source: if self.unassigned() {
                Some(RecoverySource::Peer)
            } else {
                self.recovery_source.clone()
            },
            ..self.clone()
        }
    }

    fn unassign(&self, info: UnassignedInfo) -> Self {
        let recovery_source = if self.primary {
            match &self.recovery_source {
                Some(source) if !self.active() => source.clone(),
                _ => RecoverySource::ExistingStore,
            }
        } else {
            RecoverySource::Peer
        };
        Self {
            state: ShardRoutingState::Unassigned,
            current_node: None,
            relocating_node: None,
            recovery_source: Some(recovery_source),
            unassigned_info: Some(info),
            ..self.clone()
        }
    }
}

impl fmt::Display for ShardRouting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, node[{}], ",
            self.shard_id,
            self.current_node.as_ref().map_or("null", NodeId::as_str)
        )?;
        if let Some(target) = &self.relocating_node {
            write!(f, "relocating [{target}], ")?;
        }
        write!(
            f,
            "[{}], s[{}]",
            if self.primary { "P" } else { "R" },
            self.state
        )
    }
}

/// Every shard copy of every index, grouped by shard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTable {
    shards: BTreeMap<ShardId, Vec<ShardRouting>>,
}

impl RoutingTable {
    /// An empty routing table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add unassigned copies for every shard of a new index.
    ///
    /// Primaries recover from `primary_source`, replicas from their primary.
    pub fn add_index(&mut self, index: &IndexMetadata, primary_source: &RecoverySource) {
        let reason = match primary_source {
            RecoverySource::Snapshot { .. } => UnassignedReason::NewIndexRestored,
            _ => UnassignedReason::IndexCreated,
        };
        for id in 0..index.number_of_shards() {
            let shard_id = ShardId::new(index.name(), id);
            let mut copies = vec![ShardRouting::new_unassigned(
                shard_id.clone(),
                0,
                true,
                primary_source.clone(),
                UnassignedInfo::new(reason),
            )];
            for copy in 1..=index.number_of_replicas() {
                copies.push(ShardRouting::new_unassigned(
                    shard_id.clone(),
                    copy,
                    false,
                    RecoverySource::Peer,
                    UnassignedInfo::new(reason),
                ));
            }
            self.shards.insert(shard_id, copies);
        }
    }

    /// Drop every shard of an index
    pub fn remove_index(&mut self, index: &str) {
        self.shards.retain(|shard_id, _| shard_id.index() != index);
    }

    /// Replace a copy with its next value.
    ///
    /// Returns false if the copy is not part of the table.
    pub fn update(&mut self, shard: ShardRouting) -> bool {
        let Some(copies) = self.shards.get_mut(shard.shard_id()) else {
            return false;
        };
        match copies.iter_mut().find(|existing| existing.is_same_copy(&shard)) {
            Some(existing) => {
                *existing = shard;
                true
            }
            None => false,
        }
    }

    /// Look up the current value of a copy
    #[must_use]
    pub fn get(&self, shard_id: &ShardId, copy: u32) -> Option<&ShardRouting> {
        self.copies(shard_id).iter().find(|s| s.copy() == copy)
    }

    /// All copies of one shard
    #[must_use]
    pub fn copies(&self, shard_id: &ShardId) -> &[ShardRouting] {
        self.shards.get(shard_id).map_or(&[], Vec::as_slice)
    }

    /// All shard ids
    pub fn shard_ids(&self) -> impl Iterator<Item = &ShardId> {
        self.shards.keys()
    }

    /// All copies of all shards
    pub fn iter(&self) -> impl Iterator<Item = &ShardRouting> {
        self.shards.values().flatten()
    }

    /// All copies of one index
    pub fn index_shards<'a>(&'a self, index: &'a str) -> impl Iterator<Item = &'a ShardRouting> {
        self.iter().filter(move |s| s.shard_id().index() == index)
    }

    /// The primary copy of a shard
    #[must_use]
    pub fn primary(&self, shard_id: &ShardId) -> Option<&ShardRouting> {
        self.copies(shard_id).iter().find(|s| s.primary())
    }

    /// The primary copy of a shard, if it is active
    #[must_use]
    pub fn active_primary(&self, shard_id: &ShardId) -> Option<&ShardRouting> {
        self.primary(shard_id).filter(|s| s.active())
    }

    /// Copies whose current node is `node_id`
    pub fn shards_on_node<'a>(
        &'a self,
        node_id: &'a str,
    ) -> impl Iterator<Item = &'a ShardRouting> {
        self.iter()
            .filter(move |s| s.current_node().is_some_and(|n| n.as_str() == node_id))
    }

    /// Copies on `node_id`, counting relocations into it
    pub fn shards_on_node_including_incoming<'a>(
        &'a self,
        node_id: &'a str,
    ) -> impl Iterator<Item = &'a ShardRouting> {
        self.iter().filter(move |s| {
            s.current_node().is_some_and(|n| n.as_str() == node_id)
                || s.relocating_node().is_some_and(|n| n.as_str() == node_id)
        })
    }

    /// Unassigned copies, primaries first
    #[must_use]
    pub fn unassigned(&self) -> Vec<&ShardRouting> {
        let mut unassigned: Vec<&ShardRouting> = self.iter().filter(|s| s.unassigned()).collect();
        unassigned.sort_by_key(|s| !s.primary());
        unassigned
    }

    /// Nodes holding or receiving a copy of the shard
    #[must_use]
    pub fn nodes_holding(&self, shard_id: &ShardId) -> BTreeSet<NodeId> {
        self.copies(shard_id)
            .iter()
            .flat_map(|s| s.current_node().into_iter().chain(s.relocating_node()))
            .cloned()
            .collect()
    }

    /// Number of copies currently relocating
    #[must_use]
    pub fn relocating_count(&self) -> usize {
        self.iter().filter(|s| s.relocating()).count()
    }

    /// Peer recoveries targeting `node_id`: initializing replicas and
    /// relocations into the node
    #[must_use]
    pub fn incoming_recoveries(&self, node_id: &str) -> usize {
        self.iter()
            .filter(|s| {
                (s.initializing()
                    && !s.primary()
                    && s.current_node().is_some_and(|n| n.as_str() == node_id))
                    || (s.relocating()
                        && s.relocating_node().is_some_and(|n| n.as_str() == node_id))
            })
            .count()
    }

    /// Peer recoveries sourced from `node_id`: relocations out of the node and
    /// initializing replicas whose primary is on it
    #[must_use]
    pub fn outgoing_recoveries(&self, node_id: &str) -> usize {
        self.iter()
            .filter(|s| {
                if s.relocating() {
                    return s.current_node().is_some_and(|n| n.as_str() == node_id);
                }
                s.initializing()
                    && !s.primary()
                    && self
                        .active_primary(s.shard_id())
                        .and_then(ShardRouting::current_node)
                        .is_some_and(|n| n.as_str() == node_id)
            })
            .count()
    }

    /// Primaries initializing on `node_id` from a non-peer source
    #[must_use]
    pub fn initial_primary_recoveries(&self, node_id: &str) -> usize {
        self.iter()
            .filter(|s| {
                s.initializing()
                    && s.primary()
                    && s.current_node().is_some_and(|n| n.as_str() == node_id)
                    && !matches!(s.recovery_source(), Some(RecoverySource::Peer) | None)
            })
            .count()
    }

    /// Whether every copy of the shard is active
    #[must_use]
    pub fn all_copies_active(&self, shard_id: &ShardId) -> bool {
        self.copies(shard_id).iter().all(ShardRouting::active)
    }

    /// Whether every primary in the table is active
    #[must_use]
    pub fn all_primaries_active(&self) -> bool {
        self.iter().filter(|s| s.primary()).all(ShardRouting::active)
    }

    /// Whether every copy in the table is active
    #[must_use]
    pub fn all_active(&self) -> bool {
        self.iter().all(ShardRouting::active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RoutingTable {
        let mut table = RoutingTable::new();
        table.add_index(&IndexMetadata::new("logs", 2, 1), &RecoverySource::EmptyStore);
        table
    }

    #[test]
    fn test_add_index_creates_unassigned_copies() {
        let table = table();
        assert_eq!(table.iter().count(), 4);
        let unassigned = table.unassigned();
        assert_eq!(unassigned.len(), 4);
        assert!(unassigned[0].primary() && unassigned[1].primary());
        assert!(!unassigned[2].primary());
        assert_eq!(
            unassigned[2].recovery_source(),
            Some(&RecoverySource::Peer)
        );
    }

    #[test]
    fn test_lifecycle_and_recovery_counts() {
        let mut table = table();
        let shard_id = ShardId::new("logs", 0);
        let primary = table.primary(&shard_id).unwrap().initialize(NodeId::new("a"));
        assert_eq!(table.initial_primary_recoveries("a"), 0);
        table.update(primary.clone());
        assert_eq!(table.initial_primary_recoveries("a"), 1);
        assert!(table.active_primary(&shard_id).is_none());

        table.update(primary.start());
        assert!(table.active_primary(&shard_id).is_some());

        let replica = table.get(&shard_id, 1).unwrap().initialize(NodeId::new("b"));
        table.update(replica.clone());
        assert_eq!(table.incoming_recoveries("b"), 1);
        assert_eq!(table.outgoing_recoveries("a"), 1);

        table.update(replica.start());
        let moving = table.get(&shard_id, 1).unwrap().relocate(NodeId::new("c"));
        table.update(moving.clone());
        assert_eq!(table.relocating_count(), 1);
        assert_eq!(table.incoming_recoveries("c"), 1);
        assert_eq!(table.outgoing_recoveries("b"), 1);
        assert_eq!(
            table.nodes_holding(&shard_id),
            BTreeSet::from([NodeId::new("a"), NodeId::new("b"), NodeId::new("c")])
        );

        let moved = moving.start();
        assert_eq!(moved.current_node().map(NodeId::as_str), Some("c"));
        assert!(moved.relocating_node().is_none());
    }

    #[test]
    fn test_failures_are_counted() {
        let table = table();
        let shard = table.primary(&ShardId::new("logs", 1)).unwrap();
        let failed = shard.initialize(NodeId::new("a")).fail("disk broke");
        let failed_again = failed.initialize(NodeId::new("a")).fail("disk broke again");

        let info = failed_again.unassigned_info().unwrap();
        assert_eq!(info.reason(), UnassignedReason::AllocationFailed);
        assert_eq!(info.failed_allocations(), 2);
        assert_eq!(info.message(), Some("disk broke again"));
        // A primary that never started keeps its original recovery source
        assert_eq!(failed_again.recovery_source(), Some(&RecoverySource::EmptyStore));
    }

    #[test]
    fn test_display() {
        let table = table();
        let shard = table.primary(&ShardId::new("logs", 0)).unwrap();
        assert_eq!(shard.to_string(), "[logs][0], node[null], [P], s[UNASSIGNED]");
        let moving = shard.initialize(NodeId::new("a")).start().relocate(NodeId::new("b"));
        assert_eq!(
            moving.to_string(),
            "[logs][0], node[a], relocating [b], [P], s[RELOCATING]"
        );
    }
}
