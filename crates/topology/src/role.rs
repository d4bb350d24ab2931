//! Node role types for the topology.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::TopologyError;

/// The possible roles of a node.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Eligible to be elected master and to vote on cluster-state commits.
    Master,

    /// Holds shard data.
    Data,

    /// Runs ingest pipelines.
    Ingest,
}

impl NodeRole {
    /// All known roles, in their canonical order.
    pub const ALL: [Self; 3] = [Self::Master, Self::Data, Self::Ingest];

    /// The role name as used in node descriptors (`master:true`).
    #[must_use]
    pub const fn role_name(self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Data => "data",
            Self::Ingest => "ingest",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.role_name())
    }
}

impl FromStr for NodeRole {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.role_name() == s)
            .ok_or_else(|| TopologyError::UnknownRole(s.to_string()))
    }
}
