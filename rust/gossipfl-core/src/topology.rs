//! Gossip topologies.
//!
//! A [`Topology`] maps every node id to the ordered list of its gossip neighbors. The adjacency
//! may be directed: `b` being a neighbor of `a` says nothing about `a` being a neighbor of `b`.
//! A node never lists itself, its own state always takes part in averaging implicitly.

use std::collections::{btree_map, BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::NodeId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Errors related to invalid adjacency definitions.
pub enum TopologyError {
    #[error("node {0} lists itself as a neighbor")]
    SelfLoop(NodeId),
    #[error("node {0} is defined more than once")]
    DuplicateNode(NodeId),
    #[error("node {node} lists neighbor {neighbor} more than once")]
    DuplicateNeighbor { node: NodeId, neighbor: NodeId },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// A static adjacency structure over node ids.
pub struct Topology(BTreeMap<NodeId, Vec<NodeId>>);

impl Topology {
    /// Creates a topology from `(node, neighbors)` pairs.
    ///
    /// # Errors
    /// Fails if a node lists itself, lists a neighbor twice or is defined twice.
    pub fn new<I>(adjacency: I) -> Result<Self, TopologyError>
    where
        I: IntoIterator<Item = (NodeId, Vec<NodeId>)>,
    {
        let mut topology = BTreeMap::new();
        for (node, neighbors) in adjacency {
            let mut seen = BTreeSet::new();
            for &neighbor in &neighbors {
                if neighbor == node {
                    return Err(TopologyError::SelfLoop(node));
                }
                if !seen.insert(neighbor) {
                    return Err(TopologyError::DuplicateNeighbor { node, neighbor });
                }
            }
            if topology.insert(node, neighbors).is_some() {
                return Err(TopologyError::DuplicateNode(node));
            }
        }
        Ok(Self(topology))
    }

    /// Creates a topology without any edges.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a bidirectional ring over the nodes `0..n`.
    pub fn ring(n: NodeId) -> Self {
        let adjacency = (0..n).map(|node| {
            let neighbors = match n {
                0 | 1 => vec![],
                2 => vec![1 - node],
                _ => vec![(node + n - 1) % n, (node + 1) % n],
            };
            (node, neighbors)
        });
        Self(adjacency.collect())
    }

    /// Creates a fully connected topology over the nodes `0..n`.
    pub fn complete(n: NodeId) -> Self {
        let adjacency = (0..n).map(|node| (node, (0..n).filter(|&other| other != node).collect()));
        Self(adjacency.collect())
    }

    /// Gets the neighbors of `node`, which is empty if the node has no adjacency entry.
    pub fn neighbors(&self, node: NodeId) -> &[NodeId] {
        self.0.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Creates an iterator over the nodes which have an adjacency entry.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.0.keys().copied()
    }

    /// Creates an iterator over all `(node, neighbors)` entries in ascending node order.
    pub fn iter(&self) -> btree_map::Iter<'_, NodeId, Vec<NodeId>> {
        self.0.iter()
    }

    /// Gets the number of adjacency entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Checks whether every edge `a -> b` has a matching edge `b -> a`.
    pub fn is_symmetric(&self) -> bool {
        self.iter().all(|(&node, neighbors)| {
            neighbors
                .iter()
                .all(|&neighbor| self.neighbors(neighbor).contains(&node))
        })
    }

    /// Lists the `(node, neighbor)` edges whose neighbor is not contained in `domain`.
    pub fn unknown_neighbors(&self, domain: &BTreeSet<NodeId>) -> Vec<(NodeId, NodeId)> {
        self.iter()
            .flat_map(|(&node, neighbors)| neighbors.iter().map(move |&neighbor| (node, neighbor)))
            .filter(|(_, neighbor)| !domain.contains(neighbor))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Topology {
        Topology::new(vec![
            (0, vec![1, 2]),
            (1, vec![2]),
            (2, vec![1, 3, 5]),
            (3, vec![2]),
            (4, vec![6]),
            (5, vec![2, 6]),
            (6, vec![5, 4]),
        ])
        .unwrap()
    }

    #[test]
    fn test_neighbors_keep_order() {
        let topology = sample();
        assert_eq!(topology.neighbors(6), &[5, 4]);
        assert_eq!(topology.neighbors(2), &[1, 3, 5]);
        assert!(topology.neighbors(42).is_empty());
        assert_eq!(topology.len(), 7);
    }

    #[test]
    fn test_directed_adjacency() {
        let topology = sample();
        assert!(!topology.is_symmetric());
        assert!(topology.neighbors(6).contains(&5));
        assert!(!topology.neighbors(4).contains(&5));
        assert!(Topology::ring(5).is_symmetric());
        assert!(Topology::complete(4).is_symmetric());
    }

    #[test]
    fn test_invalid_adjacency() {
        assert_eq!(
            Topology::new(vec![(0, vec![1, 0])]),
            Err(TopologyError::SelfLoop(0))
        );
        assert_eq!(
            Topology::new(vec![(0, vec![1]), (0, vec![2])]),
            Err(TopologyError::DuplicateNode(0))
        );
        assert_eq!(
            Topology::new(vec![(3, vec![1, 2, 1])]),
            Err(TopologyError::DuplicateNeighbor {
                node: 3,
                neighbor: 1
            })
        );
    }

    #[test]
    fn test_presets() {
        let ring = Topology::ring(4);
        assert_eq!(ring.neighbors(0), &[3, 1]);
        assert_eq!(ring.neighbors(3), &[2, 0]);
        assert_eq!(Topology::ring(2).neighbors(1), &[0]);
        assert!(Topology::ring(1).neighbors(0).is_empty());

        let complete = Topology::complete(3);
        assert_eq!(complete.neighbors(1), &[0, 2]);
    }

    #[test]
    fn test_unknown_neighbors() {
        let topology = Topology::new(vec![(0, vec![1, 99]), (1, vec![0])]).unwrap();
        let domain = vec![0, 1].into_iter().collect();
        assert_eq!(topology.unknown_neighbors(&domain), vec![(0, 99)]);
    }
}
