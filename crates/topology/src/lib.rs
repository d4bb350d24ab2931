//! Cluster topology for Keystone
//!
//! This crate provides:
//! - Node identity types (`NodeId`, `Node`, `NodeRole`)
//! - Immutable node directory snapshots (`Nodes`)
//! - Resolution of node descriptors (`NodeDescriptionMatcher`)
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod error;
pub mod matcher;
pub mod node;
pub mod node_id;
pub mod nodes;
pub mod pattern;
pub mod role;

pub use error::TopologyError;
pub use matcher::NodeDescriptionMatcher;
pub use node::{DEFAULT_NODE_VERSION, Node, NodeBuilder};
pub use node_id::NodeId;
pub use nodes::{Nodes, NodesBuilder};
pub use role::NodeRole;
