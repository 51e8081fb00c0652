use std::collections::BTreeMap;

use gossipfl_core::{ModelState, NodeId};

use crate::{
    aggregation::{apply_updates, Aggregation, AggregationError, LocalUpdate, Strategy},
    store::NodeStateStore,
};

/// Centralized federated averaging.
///
/// The trained states of the eligible nodes are averaged into one global state, which every node
/// receives. The average is weighted by the number of local samples if `weighted` is set.
/// Integer parameters are taken from the eligible node with the smallest id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StarAggregator {
    weighted: bool,
    proximal_mu: Option<f64>,
}

impl StarAggregator {
    /// Creates a FedAvg aggregator.
    pub fn fedavg(weighted: bool) -> Self {
        Self {
            weighted,
            proximal_mu: None,
        }
    }

    /// Creates a FedProx aggregator, which forwards `mu` to local training.
    pub fn fedprox(mu: f64, weighted: bool) -> Self {
        Self {
            weighted,
            proximal_mu: Some(mu),
        }
    }

    fn weight(&self, update: &LocalUpdate) -> f64 {
        if self.weighted {
            update.samples as f64
        } else {
            1.
        }
    }
}

impl Strategy for StarAggregator {
    fn name(&self) -> &'static str {
        if self.proximal_mu.is_some() {
            "fedprox"
        } else {
            "fedavg"
        }
    }

    fn proximal_mu(&self) -> Option<f64> {
        self.proximal_mu
    }

    fn aggregate(
        &self,
        store: &NodeStateStore,
        updates: BTreeMap<NodeId, LocalUpdate>,
    ) -> Result<Aggregation, AggregationError> {
        let weights = updates
            .iter()
            .map(|(&node, update)| (node, self.weight(update)))
            .collect::<Vec<_>>();
        let representative = match weights.first() {
            Some(&(node, _)) => node,
            None => {
                debug!("no updates to aggregate");
                return Ok(store.clone().into());
            }
        };

        let working = apply_updates(
            store,
            updates.into_iter().map(|(node, update)| (node, update.state)),
        )?;
        let weighted_states = weights
            .iter()
            .filter_map(|(node, weight)| working.get(node).map(|state| (state, *weight)))
            .collect::<Vec<_>>();
        let global = ModelState::weighted_average(&weighted_states).map_err(|source| {
            AggregationError::ShapeMismatch {
                node: representative,
                source,
            }
        })?;

        Ok(store
            .nodes()
            .map(|node| (node, global.clone()))
            .collect::<NodeStateStore>()
            .into())
    }
}

#[cfg(test)]
mod tests {
    use gossipfl_core::testutils::{
        assert_states_close,
        counter,
        shifted,
        toy_state,
        with_counter,
    };

    use super::*;

    fn updates(updates: Vec<(NodeId, ModelState, usize)>) -> BTreeMap<NodeId, LocalUpdate> {
        updates
            .into_iter()
            .map(|(node, state, samples)| (node, LocalUpdate::new(state, samples)))
            .collect()
    }

    #[test]
    fn test_every_node_gets_the_global_state() {
        let s0 = toy_state(0.0);
        let store = NodeStateStore::init(0..4, &s0);
        let updates = updates(vec![(1, shifted(&s0, 2.), 10), (3, shifted(&s0, 6.), 30)]);

        let aggregation = StarAggregator::fedavg(false)
            .aggregate(&store, updates)
            .unwrap();

        assert_eq!(aggregation.store.domain(), store.domain());
        for (_, state) in aggregation.store.iter() {
            assert_states_close(state, &shifted(&s0, 4.));
        }
        assert!(aggregation.unknown_neighbors.is_empty());
    }

    #[test]
    fn test_weighted_by_samples() {
        let s0 = toy_state(0.0);
        let store = NodeStateStore::init(0..2, &s0);
        let updates = updates(vec![(0, shifted(&s0, 2.), 10), (1, shifted(&s0, 6.), 30)]);

        let next = StarAggregator::fedprox(0.1, true)
            .aggregate(&store, updates)
            .unwrap()
            .store;

        assert_states_close(next.get(0).unwrap(), &shifted(&s0, 5.));
        assert_states_close(next.get(1).unwrap(), &shifted(&s0, 5.));
    }

    #[test]
    fn test_integer_parameters_of_first_eligible_node() {
        let s0 = toy_state(0.0);
        let store = NodeStateStore::init(0..3, &s0);
        let updates = updates(vec![
            (2, with_counter(s0.clone(), 8), 1),
            (1, with_counter(s0.clone(), 5), 1),
        ]);

        let next = StarAggregator::fedavg(true)
            .aggregate(&store, updates)
            .unwrap()
            .store;

        for (_, state) in next.iter() {
            assert_eq!(counter(state), 5);
        }
    }

    #[test]
    fn test_no_updates() {
        let s0 = toy_state(0.0);
        let store: NodeStateStore = vec![(0, shifted(&s0, 1.)), (1, shifted(&s0, 2.))]
            .into_iter()
            .collect();

        let next = StarAggregator::fedavg(true)
            .aggregate(&store, BTreeMap::new())
            .unwrap()
            .store;
        assert_eq!(next, store);
    }

    #[test]
    fn test_unknown_node() {
        let s0 = toy_state(0.0);
        let store = NodeStateStore::init(0..2, &s0);
        let result = StarAggregator::fedavg(false).aggregate(&store, updates(vec![(5, s0, 1)]));
        assert_eq!(result, Err(AggregationError::UnknownNode(5)));
    }
}
