//! Identifiers shared by the coordinator and its collaborators.

/// The identifier of a simulated node (a client of the federation).
pub type NodeId = u32;

/// The identifier of a communication round. The first round has the id `1`.
pub type RoundId = u64;
