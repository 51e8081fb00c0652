#![cfg_attr(docsrs, feature(doc_cfg))]
//! # gossipfl-core
//!
//! The building blocks shared by the gossipfl coordinator:
//!
//! - [`ModelState`]: an opaque snapshot of the trainable parameters of a model, i.e. a mapping
//!   from parameter names to [`Tensor`]s. Model states can be copied and averaged.
//! - [`Topology`]: a static, possibly directed, adjacency structure over node ids which defines
//!   the gossip neighbors of every node.
//!
//! Nothing in this crate knows how a model is trained. Training is the job of an external
//! collaborator which receives a [`ModelState`] and hands back an updated one.
//!
//! [`ModelState`]: crate::model::ModelState
//! [`Tensor`]: crate::model::Tensor
//! [`Topology`]: crate::topology::Topology

pub mod common;
pub mod model;
pub mod topology;

#[cfg(any(test, feature = "testutils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "testutils")))]
pub mod testutils;

pub use self::{
    common::{NodeId, RoundId},
    model::{ModelState, ShapeMismatchError, Tensor, TensorKind},
    topology::{Topology, TopologyError},
};
