//! The contract with the local training and evaluation collaborators.
//!
//! The coordinator never trains a model itself. For every eligible node it builds a
//! [`TrainingJob`] (the node's own model state plus a [`TrainingTask`]) and hands it to a
//! [`LocalTrainer`]. The jobs of one round are independent of each other and are executed in
//! parallel.

use rand::Rng;
use rayon::prelude::*;
use thiserror::Error;

use gossipfl_core::{ModelState, NodeId};

/// The parameters of a local training run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingTask {
    /// The number of local epochs.
    pub local_epochs: u32,
    /// The coefficient of the proximal term (FedProx), if any.
    pub proximal_mu: Option<f64>,
}

/// The result of a local training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOutcome {
    /// The trained model state.
    pub state: ModelState,
    /// The local loss after training. Only used for reporting.
    pub loss: f64,
    /// The number of local samples the state was trained on.
    pub samples: usize,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("local training failed: {0}")]
/// An error reported by a training or evaluation collaborator.
pub struct TrainingError(pub String);

/// Trains a model state on the private shard of a node.
#[cfg_attr(test, mockall::automock)]
pub trait LocalTrainer: Send + Sync {
    /// Trains `state` on the shard of `node`.
    ///
    /// # Errors
    /// Fails if the node is unknown to the trainer or the state can't be trained.
    fn train(
        &self,
        node: NodeId,
        state: ModelState,
        task: &TrainingTask,
    ) -> Result<TrainingOutcome, TrainingError>;
}

/// Evaluates a model state, e.g. the mean of all node states, on held out data.
#[cfg_attr(test, mockall::automock)]
pub trait Evaluator: Send + Sync {
    /// Computes the loss of `state`.
    ///
    /// # Errors
    /// Fails if the state can't be evaluated.
    fn evaluate(&self, state: &ModelState) -> Result<f64, TrainingError>;
}

/// How the number of local epochs is chosen for every training job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochSchedule {
    /// Every node trains for the same number of epochs.
    Fixed(u32),
    /// Every node trains for a number of epochs drawn uniformly from `1..=max`.
    Uniform { max: u32 },
}

impl EpochSchedule {
    /// Draws the number of local epochs of one training job.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        match *self {
            EpochSchedule::Fixed(epochs) => epochs,
            EpochSchedule::Uniform { max } => rng.gen_range(1..=max.max(1)),
        }
    }
}

/// A model state dispatched to a node, together with its training parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingJob {
    pub node: NodeId,
    pub state: ModelState,
    pub task: TrainingTask,
}

/// Runs all jobs on the rayon thread pool.
///
/// The results are returned in the order of `jobs`, whatever the order of completion.
pub fn train_all(
    trainer: &dyn LocalTrainer,
    jobs: Vec<TrainingJob>,
) -> Vec<(NodeId, Result<TrainingOutcome, TrainingError>)> {
    jobs.into_par_iter()
        .map(|TrainingJob { node, state, task }| {
            debug!(node, epochs = task.local_epochs, "training locally");
            (node, trainer.train(node, state, &task))
        })
        .collect()
}
