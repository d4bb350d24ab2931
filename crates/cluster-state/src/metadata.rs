//! Cluster and index metadata

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::coordination::CoordinationMetadata;
use crate::filters::AllocationFilters;
use crate::settings::{EnableAllocation, EnableRebalance};

/// Default number of failed allocations after which a shard is left unassigned
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Per-index settings relevant to allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Index-level node filters
    pub filters: AllocationFilters,
    /// Maximum copies of this index on a single node
    pub total_shards_per_node: Option<u32>,
    /// Failed allocations tolerated per copy (default: 5)
    pub max_retries: u32,
    /// Overrides the cluster-wide allocation enable setting
    pub allocation_enable: Option<EnableAllocation>,
    /// Overrides the cluster-wide rebalance enable setting
    pub rebalance_enable: Option<EnableRebalance>,
    /// Index this one was shrunk or split from
    pub resize_source: Option<String>,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            filters: AllocationFilters::default(),
            total_shards_per_node: None,
            max_retries: DEFAULT_MAX_RETRIES,
            allocation_enable: None,
            rebalance_enable: None,
            resize_source: None,
        }
    }
}

/// Metadata of a single index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    name: String,
    number_of_shards: u32,
    number_of_replicas: u32,
    settings: IndexSettings,
}

impl IndexMetadata {
    /// Create index metadata with default settings
    pub fn new(name: impl Into<String>, number_of_shards: u32, number_of_replicas: u32) -> Self {
        Self {
            name: name.into(),
            number_of_shards,
            number_of_replicas,
            settings: IndexSettings::default(),
        }
    }

    /// Replace the index settings
    #[must_use]
    pub fn with_settings(mut self, settings: IndexSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Index name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of primary shards
    #[must_use]
    pub const fn number_of_shards(&self) -> u32 {
        self.number_of_shards
    }

    /// Number of replicas per primary
    #[must_use]
    pub const fn number_of_replicas(&self) -> u32 {
        self.number_of_replicas
    }

    /// Allocation related settings
    #[must_use]
    pub const fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    /// Shards of the resize source that shard `shard` of this index is built
    /// from.
    ///
    /// Shrinking maps several source shards onto one target shard, splitting
    /// maps one source shard onto several targets.
    #[must_use]
    pub fn resize_source_shards(&self, shard: u32, source: &Self) -> Vec<u32> {
        let target_shards = self.number_of_shards.max(1);
        let source_shards = source.number_of_shards.max(1);
        if source_shards >= target_shards {
            let factor = source_shards / target_shards;
            (shard * factor..(shard + 1) * factor).collect()
        } else {
            let factor = target_shards / source_shards;
            vec![shard / factor]
        }
    }
}

/// Cluster-wide metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    coordination: CoordinationMetadata,
    indices: BTreeMap<String, IndexMetadata>,
}

impl Metadata {
    /// Create metadata
    #[must_use]
    pub const fn new(
        coordination: CoordinationMetadata,
        indices: BTreeMap<String, IndexMetadata>,
    ) -> Self {
        Self {
            coordination,
            indices,
        }
    }

    /// Voting configuration metadata
    #[must_use]
    pub const fn coordination(&self) -> &CoordinationMetadata {
        &self.coordination
    }

    /// Look up an index
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexMetadata> {
        self.indices.get(name)
    }

    /// All indices
    pub fn indices(&self) -> impl Iterator<Item = &IndexMetadata> {
        self.indices.values()
    }

    /// Copy with different coordination metadata
    #[must_use]
    pub fn with_coordination(&self, coordination: CoordinationMetadata) -> Self {
        Self {
            coordination,
            indices: self.indices.clone(),
        }
    }

    /// Copy with an index added or replaced
    #[must_use]
    pub fn with_index(&self, index: IndexMetadata) -> Self {
        let mut indices = self.indices.clone();
        indices.insert(index.name().to_string(), index);
        Self {
            coordination: self.coordination.clone(),
            indices,
        }
    }

    /// Copy without an index
    #[must_use]
    pub fn without_index(&self, name: &str) -> Self {
        let mut indices = self.indices.clone();
        indices.remove(name);
        Self {
            coordination: self.coordination.clone(),
            indices,
        }
    }
}
