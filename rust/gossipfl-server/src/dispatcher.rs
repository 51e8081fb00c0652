//! Selection of the eligible nodes, dispatching of their model states and collection of the
//! trained states.

use std::collections::{BTreeMap, BTreeSet};

use rand::{seq::SliceRandom, Rng};
use thiserror::Error;

use gossipfl_core::{ModelState, NodeId};

use crate::store::NodeStateStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("missing results from eligible nodes {missing:?}")]
/// Error that occurs when eligible nodes didn't return a trained state.
pub struct IncompleteRoundError {
    /// The eligible nodes without a result, in ascending order.
    pub missing: Vec<NodeId>,
}

/// Computes the number of eligible nodes among `n` nodes.
///
/// At least one node is selected whenever there are nodes at all.
pub fn eligible_count(n: usize, participation: f64) -> usize {
    if n == 0 {
        return 0;
    }
    if participation >= 1. {
        return n;
    }
    let count = (n as f64 * participation).floor() as usize;
    count.clamp(1, n)
}

/// Samples the eligible nodes of a round without replacement.
///
/// A participation of `1.0` selects every node and doesn't draw from `rng`.
pub fn select_eligible<R>(nodes: &[NodeId], participation: f64, rng: &mut R) -> BTreeSet<NodeId>
where
    R: Rng + ?Sized,
{
    let count = eligible_count(nodes.len(), participation);
    if count == nodes.len() {
        return nodes.iter().copied().collect();
    }
    nodes.choose_multiple(rng, count).copied().collect()
}

/// Copies the own model state of every eligible node out of the store.
///
/// Eligible nodes which are not part of the store are skipped.
pub fn dispatch(eligible: &BTreeSet<NodeId>, store: &NodeStateStore) -> BTreeMap<NodeId, ModelState> {
    eligible
        .iter()
        .filter_map(|&node| match store.get(node) {
            Some(state) => Some((node, state.clone())),
            None => {
                warn!(node, "eligible node has no model state");
                None
            }
        })
        .collect()
}

/// Checks that every eligible node returned a result.
///
/// Results of nodes which were never dispatched are discarded.
///
/// # Errors
/// Fails if an eligible node has no result.
pub fn collect<T>(
    eligible: &BTreeSet<NodeId>,
    mut results: BTreeMap<NodeId, T>,
) -> Result<BTreeMap<NodeId, T>, IncompleteRoundError> {
    results.retain(|node, _| {
        let dispatched = eligible.contains(node);
        if !dispatched {
            warn!(node, "discarding result of a node which was not dispatched");
        }
        dispatched
    });

    let missing = eligible
        .iter()
        .filter(|node| !results.contains_key(node))
        .copied()
        .collect::<Vec<_>>();
    if missing.is_empty() {
        Ok(results)
    } else {
        Err(IncompleteRoundError { missing })
    }
}
