use keystone_cluster_state::{RecoverySource, ShardOperationState, ShardRouting};
use keystone_topology::Node;

use super::AllocationDecider;
use crate::decision::Decision;
use crate::routing_allocation::RoutingAllocation;

const NAME: &str = "restore_in_progress";

/// Allocates restored primaries only while their restore is healthy
#[derive(Debug, Default, Clone, Copy)]
pub struct RestoreInProgressAllocationDecider;

impl AllocationDecider for RestoreInProgressAllocationDecider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_allocate(
        &self,
        shard: &ShardRouting,
        _node: &Node,
        allocation: &RoutingAllocation<'_>,
    ) -> Decision {
        let Some(RecoverySource::Snapshot {
            restore_uuid,
            snapshot,
        }) = shard.recovery_source()
        else {
            return Decision::yes(NAME, "ignored as shard is not being recovered from a snapshot");
        };
        if !shard.primary() {
            return Decision::YES;
        }

        match allocation
            .restore_in_progress()
            .shard_state(restore_uuid, shard.shard_id())
        {
            Some(ShardOperationState::Failure) => Decision::no(
                NAME,
                format!(
                    "shard has failed to be restored from the snapshot [{snapshot}], manually close or delete the index to retry"
                ),
            ),
            Some(_) => Decision::yes(NAME, "shard is currently being restored"),
            None => Decision::no(
                NAME,
                format!(
                    "shard was restored from the snapshot [{snapshot}] by restore [{restore_uuid}] which is no longer in progress"
                ),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decider::test_support::{Fixture, data_node};
    use crate::decision::Outcome;
    use keystone_cluster_state::{
        IndexMetadata, RestoreEntry, RestoreInProgress, RoutingTable, ShardId,
    };
    use std::collections::BTreeMap;

    fn fixture(state: Option<ShardOperationState>) -> Fixture {
        let mut fixture = Fixture::new([data_node("a")], Vec::new());
        let index = IndexMetadata::new("restored", 1, 0);
        let mut routing = RoutingTable::new();
        routing.add_index(
            &index,
            &RecoverySource::Snapshot {
                restore_uuid: "r1".to_string(),
                snapshot: "nightly".to_string(),
            },
        );
        let restores = state.map_or_else(RestoreInProgress::default, |state| {
            RestoreInProgress::new(BTreeMap::from([(
                "r1".to_string(),
                RestoreEntry {
                    snapshot: "nightly".to_string(),
                    shards: BTreeMap::from([(ShardId::new("restored", 0), state)]),
                },
            )]))
        });
        fixture.state = fixture
            .state
            .to_builder()
            .metadata(fixture.state.metadata().with_index(index))
            .routing_table(routing)
            .restore_in_progress(restores)
            .build();
        fixture
    }

    #[test]
    fn test_restore_states() {
        let decider = RestoreInProgressAllocationDecider;
        for (state, expected) in [
            (Some(ShardOperationState::Init), Outcome::Yes),
            (Some(ShardOperationState::Failure), Outcome::No),
            (None, Outcome::No),
        ] {
            let fixture = fixture(state);
            let shard = fixture.shard("restored", 0, 0);
            let allocation = fixture.allocation();
            assert_eq!(
                decider
                    .can_allocate(&shard, fixture.node("a"), &allocation)
                    .outcome(),
                expected,
                "{state:?}"
            );
        }
    }
}
