//! Shards allocators
//!
//! Exactly one allocator is active per cluster, selected by name through the
//! `cluster.routing.allocation.type` setting.

mod balanced;

use std::collections::BTreeMap;
use std::sync::Arc;

use keystone_cluster_state::settings::BALANCED_ALLOCATOR;

use crate::decider::AllocationDeciders;
use crate::error::{AllocationError, AllocationResult};
use crate::routing_allocation::RoutingAllocation;

pub use balanced::BalancedShardsAllocator;

/// Places, moves and rebalances shards
pub trait ShardsAllocator: Send + Sync + 'static {
    /// Update the working routing table of `allocation`, consulting
    /// `deciders` for every placement.
    fn allocate(&self, allocation: &mut RoutingAllocation<'_>, deciders: &AllocationDeciders);
}

/// Shards allocators by name
#[derive(Clone, Default)]
pub struct AllocatorRegistry {
    allocators: BTreeMap<String, Arc<dyn ShardsAllocator>>,
}

impl AllocatorRegistry {
    /// An empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the balanced allocator
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut allocators: BTreeMap<String, Arc<dyn ShardsAllocator>> = BTreeMap::new();
        allocators.insert(
            BALANCED_ALLOCATOR.to_string(),
            Arc::new(BalancedShardsAllocator),
        );
        Self { allocators }
    }

    /// Register an allocator under `name`
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::DuplicateAllocator`] if the name is taken.
    pub fn register(
        mut self,
        name: impl Into<String>,
        allocator: Arc<dyn ShardsAllocator>,
    ) -> AllocationResult<Self> {
        let name = name.into();
        if self.allocators.contains_key(&name) {
            return Err(AllocationError::DuplicateAllocator(name));
        }
        self.allocators.insert(name, allocator);
        Ok(self)
    }

    /// Look up an allocator
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::UnknownAllocator`] if no allocator has that
    /// name.
    pub fn get(&self, name: &str) -> AllocationResult<Arc<dyn ShardsAllocator>> {
        self.allocators
            .get(name)
            .cloned()
            .ok_or_else(|| AllocationError::UnknownAllocator(name.to_string()))
    }

    /// Registered names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.allocators.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for AllocatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
