//! The node state store.
//!
//! The [`NodeStateStore`] holds exactly one [`ModelState`] per node. Its domain is fixed when it
//! is initialized and the store is only ever replaced as a whole, by the aggregation at the end
//! of a round.

use std::{
    collections::{btree_map, BTreeMap, BTreeSet},
    iter::FromIterator,
};

use serde::{Deserialize, Serialize};

use gossipfl_core::{ModelState, NodeId, ShapeMismatchError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// A mapping from node ids to their current model states.
pub struct NodeStateStore(BTreeMap<NodeId, ModelState>);

impl NodeStateStore {
    /// Creates a store in which every node holds its own copy of `initial`.
    pub fn init<I>(nodes: I, initial: &ModelState) -> Self
    where
        I: IntoIterator<Item = NodeId>,
    {
        nodes.into_iter().map(|node| (node, initial.clone())).collect()
    }

    pub fn get(&self, node: NodeId) -> Option<&ModelState> {
        self.0.get(&node)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.0.contains_key(&node)
    }

    /// Gets the number of nodes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Creates an iterator over the node ids in ascending order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.0.keys().copied()
    }

    /// Gets the node domain of this store.
    pub fn domain(&self) -> BTreeSet<NodeId> {
        self.nodes().collect()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, NodeId, ModelState> {
        self.0.iter()
    }

    /// Computes the mean of the model states of all nodes.
    ///
    /// # Errors
    /// Fails if the store is empty or the model states are incompatible.
    pub fn mean_state(&self) -> Result<ModelState, ShapeMismatchError> {
        let states = self.0.values().collect::<Vec<_>>();
        ModelState::average(&states)
    }
}

impl FromIterator<(NodeId, ModelState)> for NodeStateStore {
    fn from_iter<I: IntoIterator<Item = (NodeId, ModelState)>>(iter: I) -> Self {
        NodeStateStore(iter.into_iter().collect())
    }
}

impl IntoIterator for NodeStateStore {
    type Item = (NodeId, ModelState);
    type IntoIter = btree_map::IntoIter<NodeId, ModelState>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
