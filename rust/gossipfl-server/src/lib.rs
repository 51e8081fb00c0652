#![cfg_attr(docsrs, feature(doc_cfg))]
//! # gossipfl: federated learning experiments on simulated nodes
//!
//! This crate runs federated learning experiments round after round. Every simulated node holds
//! its own [`ModelState`] and a private data shard. In every round the coordinator
//!
//! 1. selects a fraction of the nodes as *eligible*,
//! 2. sends every eligible node its *own* current model state,
//! 3. lets an external collaborator train the states locally (in parallel),
//! 4. collects the trained states and
//! 5. aggregates them into the node state store.
//!
//! Two aggregation strategies are available:
//! - **star**: the classic centralized federated averaging (FedAvg, and FedProx when a proximal
//!   coefficient is forwarded to local training). All nodes receive the same global model.
//! - **gossip**: a decentralized peer-to-peer variant. Every node replaces its state with the
//!   mean of itself and its neighbors in a static [`Topology`].
//!
//! The round loop is driven by the [`StateMachine`]. Local training and evaluation are
//! abstracted by the [`LocalTrainer`] and [`Evaluator`] traits, the [`simulation`] module
//! provides a synthetic implementation of both so that experiments can run without a machine
//! learning framework.
//!
//! [`ModelState`]: gossipfl_core::ModelState
//! [`Topology`]: gossipfl_core::Topology
//! [`StateMachine`]: crate::state_machine::StateMachine
//! [`LocalTrainer`]: crate::training::LocalTrainer
//! [`Evaluator`]: crate::training::Evaluator

#[macro_use]
extern crate async_trait;
#[macro_use]
extern crate tracing;

pub mod aggregation;
pub mod dispatcher;
pub mod report;
pub mod settings;
pub mod simulation;
pub mod state_machine;
pub mod store;
pub mod training;
