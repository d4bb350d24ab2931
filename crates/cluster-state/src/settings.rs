//! Dynamic cluster settings
//!
//! [`Settings`] is a plain snapshot of every dynamic setting. [`ClusterSettings`]
//! is the shared handle services hold: readers take cheap snapshots, writers
//! apply `key = value` updates which are validated and broadcast to
//! subscribers.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

use crate::filters::AllocationFilters;
use crate::{ClusterStateError, ClusterStateResult};

/// Key of the maximum number of voting config exclusions
pub const MAX_VOTING_CONFIG_EXCLUSIONS: &str = "cluster.max_voting_config_exclusions";

const ALLOCATION_PREFIX: &str = "cluster.routing.allocation.";

/// Name of the default shards allocator
pub const BALANCED_ALLOCATOR: &str = "balanced";

macro_rules! setting_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Setting value for this variant
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(format!(
                        "expected one of [{}]",
                        [$($text),+].join(", ")
                    )),
                }
            }
        }
    };
}

setting_enum!(
    /// Which shards may be allocated
    EnableAllocation {
        /// Every shard
        All => "all",
        /// Only primaries
        Primaries => "primaries",
        /// Only primaries of newly created indices
        NewPrimaries => "new_primaries",
        /// Nothing
        None => "none",
    }
);

setting_enum!(
    /// Which shards may be rebalanced
    EnableRebalance {
        /// Every shard
        All => "all",
        /// Only primaries
        Primaries => "primaries",
        /// Only replicas
        Replicas => "replicas",
        /// Nothing
        None => "none",
    }
);

setting_enum!(
    /// When cluster-wide rebalancing is allowed
    AllowRebalance {
        /// Regardless of shard states
        Always => "always",
        /// Once every primary is active
        IndicesPrimariesActive => "indices_primaries_active",
        /// Once every shard copy is active
        IndicesAllActive => "indices_all_active",
    }
);

/// Settings of the voting configuration overlay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinationSettings {
    /// Maximum number of voting config exclusions (default: 10)
    pub max_voting_config_exclusions: usize,
}

impl Default for CoordinationSettings {
    fn default() -> Self {
        Self {
            max_voting_config_exclusions: 10,
        }
    }
}

/// Disk watermark settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskSettings {
    /// Whether the disk threshold decider is active (default: true)
    pub threshold_enabled: bool,
    /// Used-disk percentage above which new replicas are refused (default: 85)
    pub watermark_low: f64,
    /// Used-disk percentage above which shards are moved away (default: 90)
    pub watermark_high: f64,
}

impl Default for DiskSettings {
    fn default() -> Self {
        Self {
            threshold_enabled: true,
            watermark_low: 85.0,
            watermark_high: 90.0,
        }
    }
}

/// Weights of the balanced allocator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSettings {
    /// Weight of the total shard count per node (default: 0.45)
    pub shard: f64,
    /// Weight of the per-index shard count per node (default: 0.55)
    pub index: f64,
    /// Minimal weight delta worth a relocation (default: 1.0)
    pub threshold: f64,
}

impl Default for BalanceSettings {
    fn default() -> Self {
        Self {
            shard: 0.45,
            index: 0.55,
            threshold: 1.0,
        }
    }
}

/// Settings of shard allocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationSettings {
    /// Which shards may be allocated (default: all)
    pub enable: EnableAllocation,
    /// Which shards may be rebalanced (default: all)
    pub rebalance_enable: EnableRebalance,
    /// When rebalancing is allowed (default: `indices_all_active`)
    pub allow_rebalance: AllowRebalance,
    /// Concurrent relocations allowed cluster-wide, -1 for unlimited (default: 2)
    pub cluster_concurrent_rebalance: i32,
    /// Concurrent peer recoveries into a node (default: 2)
    pub node_concurrent_incoming_recoveries: usize,
    /// Concurrent peer recoveries out of a node (default: 2)
    pub node_concurrent_outgoing_recoveries: usize,
    /// Concurrent initial primary recoveries on a node (default: 4)
    pub node_initial_primaries_recoveries: usize,
    /// Disk watermarks
    pub disk: DiskSettings,
    /// Node attributes shard copies are spread across
    pub awareness_attributes: Vec<String>,
    /// Cluster-wide limit of shards per node
    pub total_shards_per_node: Option<u32>,
    /// Cluster-level node filters
    pub filters: AllocationFilters,
    /// Name of the active shards allocator (default: balanced)
    pub allocator: String,
    /// Balanced allocator weights
    pub balance: BalanceSettings,
}

impl Default for AllocationSettings {
    fn default() -> Self {
        Self {
            enable: EnableAllocation::All,
            rebalance_enable: EnableRebalance::All,
            allow_rebalance: AllowRebalance::IndicesAllActive,
            cluster_concurrent_rebalance: 2,
            node_concurrent_incoming_recoveries: 2,
            node_concurrent_outgoing_recoveries: 2,
            node_initial_primaries_recoveries: 4,
            disk: DiskSettings::default(),
            awareness_attributes: Vec::new(),
            total_shards_per_node: None,
            filters: AllocationFilters::default(),
            allocator: BALANCED_ALLOCATOR.to_string(),
            balance: BalanceSettings::default(),
        }
    }
}

/// Snapshot of all dynamic settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Voting configuration overlay settings
    pub coordination: CoordinationSettings,
    /// Shard allocation settings
    pub allocation: AllocationSettings,
}

impl Settings {
    /// Start building settings from the defaults
    #[must_use]
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Apply a single `key = value` update
    ///
    /// # Errors
    ///
    /// Returns an error for unknown keys and values that don't parse.
    pub fn apply(&mut self, key: &str, value: &str) -> ClusterStateResult<()> {
        if key == MAX_VOTING_CONFIG_EXCLUSIONS {
            self.coordination.max_voting_config_exclusions = parse(key, value)?;
            return Ok(());
        }
        let Some(name) = key.strip_prefix(ALLOCATION_PREFIX) else {
            if key == "cluster.routing.rebalance.enable" {
                self.allocation.rebalance_enable = parse(key, value)?;
                return Ok(());
            }
            return Err(ClusterStateError::UnknownSetting(key.to_string()));
        };

        let allocation = &mut self.allocation;
        match name {
            "enable" => allocation.enable = parse(key, value)?,
            "allow_rebalance" => allocation.allow_rebalance = parse(key, value)?,
            "cluster_concurrent_rebalance" => {
                let limit: i32 = parse(key, value)?;
                if limit < -1 {
                    return Err(invalid(key, value, "must be >= -1"));
                }
                allocation.cluster_concurrent_rebalance = limit;
            }
            "node_concurrent_incoming_recoveries" => {
                allocation.node_concurrent_incoming_recoveries = parse(key, value)?;
            }
            "node_concurrent_outgoing_recoveries" => {
                allocation.node_concurrent_outgoing_recoveries = parse(key, value)?;
            }
            "node_concurrent_recoveries" => {
                let limit = parse(key, value)?;
                allocation.node_concurrent_incoming_recoveries = limit;
                allocation.node_concurrent_outgoing_recoveries = limit;
            }
            "node_initial_primaries_recoveries" => {
                allocation.node_initial_primaries_recoveries = parse(key, value)?;
            }
            "disk.threshold_enabled" => allocation.disk.threshold_enabled = parse(key, value)?,
            "disk.watermark.low" => {
                let low = parse_percentage(key, value)?;
                if low > allocation.disk.watermark_high {
                    return Err(invalid(key, value, "low watermark must not exceed high watermark"));
                }
                allocation.disk.watermark_low = low;
            }
            "disk.watermark.high" => {
                let high = parse_percentage(key, value)?;
                if high < allocation.disk.watermark_low {
                    return Err(invalid(
                        key,
                        value,
                        "high watermark must not be below low watermark",
                    ));
                }
                allocation.disk.watermark_high = high;
            }
            "awareness.attributes" => {
                allocation.awareness_attributes = value
                    .split(',')
                    .map(str::trim)
                    .filter(|attribute| !attribute.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            "total_shards_per_node" => {
                let limit: i64 = parse(key, value)?;
                allocation.total_shards_per_node = if limit < 0 {
                    None
                } else {
                    Some(u32::try_from(limit).map_err(|e| invalid(key, value, &e.to_string()))?)
                };
            }
            "type" => {
                if value.trim().is_empty() {
                    return Err(invalid(key, value, "allocator name must not be empty"));
                }
                allocation.allocator = value.trim().to_string();
            }
            other => {
                let (filter, attribute) = match other.split_once('.') {
                    Some(("require", attribute)) => (&mut allocation.filters.require, attribute),
                    Some(("include", attribute)) => (&mut allocation.filters.include, attribute),
                    Some(("exclude", attribute)) => (&mut allocation.filters.exclude, attribute),
                    _ => return Err(ClusterStateError::UnknownSetting(key.to_string())),
                };
                if attribute.is_empty() {
                    return Err(ClusterStateError::UnknownSetting(key.to_string()));
                }
                filter.set(attribute, value);
            }
        }
        Ok(())
    }
}

fn parse<T>(key: &str, value: &str) -> ClusterStateResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| invalid(key, value, &e.to_string()))
}

fn parse_percentage(key: &str, value: &str) -> ClusterStateResult<f64> {
    let percentage: f64 = parse(key, value.trim().trim_end_matches('%'))?;
    if (0.0..=100.0).contains(&percentage) {
        Ok(percentage)
    } else {
        Err(invalid(key, value, "must be a percentage between 0 and 100"))
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> ClusterStateError {
    ClusterStateError::InvalidSetting {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Builder for [`Settings`]
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    /// Set the maximum number of voting config exclusions
    #[must_use]
    pub const fn max_voting_config_exclusions(mut self, max: usize) -> Self {
        self.settings.coordination.max_voting_config_exclusions = max;
        self
    }

    /// Replace the allocation settings
    #[must_use]
    pub fn allocation(mut self, allocation: AllocationSettings) -> Self {
        self.settings.allocation = allocation;
        self
    }

    /// Apply a `key = value` update
    ///
    /// # Errors
    ///
    /// Returns an error for unknown keys and values that don't parse.
    pub fn set(mut self, key: &str, value: &str) -> ClusterStateResult<Self> {
        self.settings.apply(key, value)?;
        Ok(self)
    }

    /// Build the settings
    #[must_use]
    pub fn build(self) -> Settings {
        self.settings
    }
}

struct Inner {
    current: RwLock<Arc<Settings>>,
    changes: watch::Sender<Arc<Settings>>,
}

/// Shared, dynamically updatable cluster settings
#[derive(Clone)]
pub struct ClusterSettings {
    inner: Arc<Inner>,
}

impl ClusterSettings {
    /// Create a handle holding `settings`
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        let settings = Arc::new(settings);
        let (changes, _) = watch::channel(settings.clone());
        Self {
            inner: Arc::new(Inner {
                current: RwLock::new(settings),
                changes,
            }),
        }
    }

    /// Snapshot of the current settings
    #[must_use]
    pub fn get(&self) -> Arc<Settings> {
        self.inner.current.read().clone()
    }

    /// Current maximum number of voting config exclusions
    #[must_use]
    pub fn max_voting_config_exclusions(&self) -> usize {
        self.inner.current.read().coordination.max_voting_config_exclusions
    }

    /// Apply a `key = value` update and notify subscribers
    ///
    /// # Errors
    ///
    /// Returns an error for unknown keys and values that don't parse; the
    /// current settings are left untouched.
    pub fn apply(&self, key: &str, value: &str) -> ClusterStateResult<()> {
        let updated = {
            let mut current = self.inner.current.write();
            let mut next = Settings::clone(&current);
            next.apply(key, value)?;
            if next == **current {
                return Ok(());
            }
            let next = Arc::new(next);
            *current = next.clone();
            next
        };
        info!("Updated setting [{}] to [{}]", key, value);
        self.inner.changes.send_replace(updated);
        Ok(())
    }

    /// Subscribe to settings updates
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<Settings>> {
        self.inner.changes.subscribe()
    }
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl fmt::Debug for ClusterSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterSettings")
            .field("current", &self.get())
            .finish()
    }
}
