//! Aggregation strategies.
//!
//! A [`Strategy`] decides how local training is parameterized and how the trained states of the
//! eligible nodes are folded into a new [`NodeStateStore`]:
//!
//! - [`StarAggregator`]: centralized federated averaging (FedAvg), optionally with a proximal
//!   term forwarded to local training (FedProx). Every node ends up with the same global state.
//! - [`GossipAggregator`]: decentralized averaging. Every node ends up with the mean of its own
//!   state and the states of its neighbors.
//!
//! Aggregation never mutates the store it is given. It either returns a complete new store or an
//! error, in which case the old store stays in place.

mod gossip;
mod star;

pub use self::{gossip::GossipAggregator, star::StarAggregator};

use std::{collections::BTreeMap, fmt};

use derive_more::Display;
use thiserror::Error;

use gossipfl_core::{ModelState, NodeId, ShapeMismatchError, Topology};

use crate::{
    settings::{AlgorithmName, AlgorithmSettings},
    store::NodeStateStore,
    training::EpochSchedule,
};

/// The trained state of an eligible node.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalUpdate {
    pub state: ModelState,
    /// The number of samples the state was trained on.
    pub samples: usize,
}

impl LocalUpdate {
    pub fn new(state: ModelState, samples: usize) -> Self {
        Self { state, samples }
    }
}

/// A topology edge which points to a node outside of the store.
///
/// The neighbor is left out of the average of the node, which is not an error.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[display(fmt = "neighbor {} of node {} is unknown", neighbor, node)]
pub struct UnknownNeighbor {
    pub node: NodeId,
    pub neighbor: NodeId,
}

/// The result of a successful aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    /// The store for the next round.
    pub store: NodeStateStore,
    /// The edges which were skipped during aggregation.
    pub unknown_neighbors: Vec<UnknownNeighbor>,
}

impl From<NodeStateStore> for Aggregation {
    fn from(store: NodeStateStore) -> Self {
        Self {
            store,
            unknown_neighbors: Vec::new(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
/// Errors which can occur during aggregation.
pub enum AggregationError {
    #[error("model state of node {node} is incompatible: {source}")]
    ShapeMismatch {
        node: NodeId,
        source: ShapeMismatchError,
    },
    #[error("received an update for node {0} which is not part of the store")]
    UnknownNode(NodeId),
}

/// The capabilities every federated learning algorithm provides.
pub trait Strategy: fmt::Debug + Send + Sync {
    /// The name of the algorithm.
    fn name(&self) -> &'static str;

    /// Gets the schedule of local epochs given the configured number of local epochs.
    fn epoch_schedule(&self, local_epochs: u32) -> EpochSchedule {
        EpochSchedule::Fixed(local_epochs)
    }

    /// Gets the coefficient of the proximal term which is forwarded to local training.
    fn proximal_mu(&self) -> Option<f64> {
        None
    }

    /// Folds the updates of the eligible nodes into a new store.
    ///
    /// # Errors
    /// Fails if an update belongs to a node outside of the store or if model states disagree in
    /// their layout. No partial result is returned.
    fn aggregate(
        &self,
        store: &NodeStateStore,
        updates: BTreeMap<NodeId, LocalUpdate>,
    ) -> Result<Aggregation, AggregationError>;
}

/// Creates the strategy of the configured algorithm.
pub fn from_settings(settings: &AlgorithmSettings, topology: Topology) -> Box<dyn Strategy> {
    match settings.name {
        AlgorithmName::FedAvg => Box::new(StarAggregator::fedavg(settings.weighted)),
        AlgorithmName::FedProx => {
            Box::new(StarAggregator::fedprox(settings.mu, settings.weighted))
        }
        AlgorithmName::P2p => Box::new(GossipAggregator::new(topology)),
    }
}

/// Overwrites the states of the updated nodes in a copy of the store.
///
/// # Errors
/// Fails if an updated node is unknown or its trained state doesn't match its prior state.
fn apply_updates<I>(
    store: &NodeStateStore,
    updates: I,
) -> Result<BTreeMap<NodeId, ModelState>, AggregationError>
where
    I: IntoIterator<Item = (NodeId, ModelState)>,
{
    let mut working = store
        .iter()
        .map(|(&node, state)| (node, state.clone()))
        .collect::<BTreeMap<_, _>>();
    for (node, state) in updates {
        let prior = working
            .get_mut(&node)
            .ok_or(AggregationError::UnknownNode(node))?;
        prior
            .check_compatible(&state)
            .map_err(|source| AggregationError::ShapeMismatch { node, source })?;
        *prior = state;
    }
    Ok(working)
}
