use std::collections::BTreeMap;

use gossipfl_core::{ModelState, NodeId, Topology};

use crate::{
    aggregation::{
        apply_updates,
        Aggregation,
        AggregationError,
        LocalUpdate,
        Strategy,
        UnknownNeighbor,
    },
    store::NodeStateStore,
    training::EpochSchedule,
};

/// Decentralized neighbor averaging over a static topology.
///
/// The next state of a node is the element-wise mean over its own working state and the working
/// states of its neighbors, where the working state of an eligible node is its trained state and
/// the working state of any other node is its state from the previous round. Integer parameters
/// are never averaged, every node keeps its own.
#[derive(Debug, Clone, PartialEq)]
pub struct GossipAggregator {
    topology: Topology,
}

impl GossipAggregator {
    pub fn new(topology: Topology) -> Self {
        Self { topology }
    }

    /// Runs one consensus step.
    ///
    /// # Errors
    /// Fails if a trained state belongs to a node outside of the store or if the states of an
    /// averaging set disagree in their layout.
    pub fn aggregate_states(
        &self,
        store: &NodeStateStore,
        trained: BTreeMap<NodeId, ModelState>,
    ) -> Result<Aggregation, AggregationError> {
        let working = apply_updates(store, trained)?;

        let mut unknown_neighbors = Vec::new();
        let store = working
            .iter()
            .map(|(&node, own)| {
                let mut averaging_set = vec![own];
                for &neighbor in self.topology.neighbors(node) {
                    match working.get(&neighbor) {
                        Some(state) => averaging_set.push(state),
                        None => unknown_neighbors.push(UnknownNeighbor { node, neighbor }),
                    }
                }
                ModelState::average(&averaging_set)
                    .map(|next| (node, next))
                    .map_err(|source| AggregationError::ShapeMismatch { node, source })
            })
            .collect::<Result<NodeStateStore, AggregationError>>()?;

        Ok(Aggregation {
            store,
            unknown_neighbors,
        })
    }
}

impl Strategy for GossipAggregator {
    fn name(&self) -> &'static str {
        "p2p"
    }

    fn epoch_schedule(&self, local_epochs: u32) -> EpochSchedule {
        EpochSchedule::Uniform { max: local_epochs }
    }

    fn aggregate(
        &self,
        store: &NodeStateStore,
        updates: BTreeMap<NodeId, LocalUpdate>,
    ) -> Result<Aggregation, AggregationError> {
        let trained = updates
            .into_iter()
            .map(|(node, update)| (node, update.state))
            .collect();
        self.aggregate_states(store, trained)
    }
}
