//! Voting configuration exclusions for Keystone
//!
//! Master-eligible nodes are withdrawn from the voting configuration before
//! they are shut down, so that the cluster never loses its quorum. This crate
//! provides:
//! - Request types for adding and clearing exclusions
//! - `VotingExclusionsCoordinator`, which commits the change through a
//!   `ClusterService` and waits for it to take effect
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod coordinator;
pub mod error;
pub mod request;

pub use coordinator::VotingExclusionsCoordinator;
pub use error::{CoordinationError, CoordinationResult};
pub use request::{
    AddVotingConfigExclusionsRequest, ClearVotingConfigExclusionsRequest, CoordinationRequest,
    DEFAULT_TIMEOUT,
};
