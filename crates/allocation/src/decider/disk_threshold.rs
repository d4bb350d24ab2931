use keystone_cluster_state::{RecoverySource, ShardRouting};
use keystone_topology::Node;

use super::AllocationDecider;
use crate::decision::Decision;
use crate::routing_allocation::RoutingAllocation;

const NAME: &str = "disk_threshold";

/// Keeps shards off nodes whose disks are filling up.
///
/// Above the low watermark only brand new primaries may be allocated. Above
/// the high watermark nothing may be allocated and shards must move away.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskThresholdDecider;

impl AllocationDecider for DiskThresholdDecider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_allocate(
        &self,
        shard: &ShardRouting,
        node: &Node,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        let disk = &allocation.settings().disk;
        if !disk.threshold_enabled {
            return Decision::yes(NAME, "the disk threshold decider is disabled");
        }
        let Some(usage) = allocation.cluster_info().disk_usage(node.id().as_str()) else {
            return Decision::yes(NAME, "disk usages are unavailable");
        };

        let used = usage.used_percent();
        if used >= disk.watermark_high {
            return Decision::no(
                NAME,
                format!(
                    "the node is above the high watermark [{}%], having [{used:.1}%] used disk",
                    disk.watermark_high
                ),
            );
        }

        let new_primary = shard.primary()
            && shard.unassigned()
            && matches!(shard.recovery_source(), Some(RecoverySource::EmptyStore));
        if used >= disk.watermark_low && !new_primary {
            return Decision::no(
                NAME,
                format!(
                    "the node is above the low watermark [{}%], having [{used:.1}%] used disk",
                    disk.watermark_low
                ),
            );
        }

        let shard_size = allocation
            .cluster_info()
            .shard_size(shard.shard_id())
            .unwrap_or(0);
        let used_after = usage.used_percent_with(shard_size);
        if used_after >= disk.watermark_high {
            return Decision::no(
                NAME,
                format!(
                    "allocating the shard to this node will bring the node above the high watermark [{}%], [{used_after:.1}%] would be used",
                    disk.watermark_high
                ),
            );
        }
        Decision::yes(NAME, format!("enough disk for shard on node, [{used:.1}%] used"))
    }

    fn can_remain(
        &self,
        _shard: &ShardRouting,
        node: &Node,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        let disk = &allocation.settings().disk;
        if !disk.threshold_enabled {
            return Decision::yes(NAME, "the disk threshold decider is disabled");
        }
        let Some(usage) = allocation.cluster_info().disk_usage(node.id().as_str()) else {
            return Decision::yes(NAME, "disk usages are unavailable");
        };
        let used = usage.used_percent();
        if used >= disk.watermark_high {
            return Decision::no(
                NAME,
                format!(
                    "the shard cannot remain on this node because it is above the high watermark [{}%], having [{used:.1}%] used disk",
                    disk.watermark_high
                ),
            );
        }
        Decision::yes(NAME, "there is enough disk on this node for the shard to remain")
    }
}
