//! A synthetic training collaborator.
//!
//! Every node owns a shard which is summarized by its local optimum and its number of samples.
//! The local optima are scattered around a common global optimum, the spread is controlled by the
//! `heterogeneity` setting. Local training runs gradient descent on the quadratic loss
//! `0.5 * ||w - optimum||²`, one step per local epoch, optionally with the proximal term
//! `0.5 * mu * ||w - w_start||²`.
//!
//! The simulated model is a linear layer (`linear.weight`, `linear.bias`) together with an
//! integer step counter (`linear.num_batches_tracked`) which is incremented by the number of
//! local epochs, like the batch counter of a normalization layer.

use std::{collections::BTreeMap, sync::Arc};

use ndarray::{arr0, ArrayD, IxDyn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use gossipfl_core::{ModelState, NodeId, Tensor};

use crate::{
    settings::SimulationSettings,
    training::{Evaluator, LocalTrainer, TrainingError, TrainingOutcome, TrainingTask},
};

pub const WEIGHT: &str = "linear.weight";
pub const BIAS: &str = "linear.bias";
pub const STEPS: &str = "linear.num_batches_tracked";

/// The stream of the seeded random source which is reserved for partitioning.
const PARTITION_STREAM: u64 = 1;

/// Creates the shared initial model state of all nodes, with all parameters set to zero.
pub fn initial_state(dimensions: usize) -> ModelState {
    let mut state = ModelState::new();
    state.insert(WEIGHT, ArrayD::<f64>::zeros(IxDyn(&[dimensions])));
    state.insert(BIAS, ArrayD::<f64>::zeros(IxDyn(&[1])));
    state.insert(STEPS, arr0(0_i64).into_dyn());
    state
}

/// The private data of a node.
#[derive(Debug, Clone, PartialEq)]
pub struct Shard {
    /// The parameters which minimize the local loss.
    pub optimum: ModelState,
    pub samples: usize,
}

/// A fixed assignment of shards to nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticPartition {
    shards: BTreeMap<NodeId, Shard>,
}

impl SyntheticPartition {
    /// Generates a shard for every node.
    pub fn generate<R>(nodes: &[NodeId], settings: &SimulationSettings, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        let global = random_state(settings.dimensions, 1., rng);
        let shards = nodes
            .iter()
            .map(|&node| {
                let noise = random_state(settings.dimensions, settings.heterogeneity, rng);
                let optimum = global
                    .iter()
                    .map(|(name, tensor)| match (tensor, noise.get(name)) {
                        (Tensor::Float(values), Some(Tensor::Float(noise))) => {
                            (name.clone(), Tensor::Float(values + noise))
                        }
                        _ => (name.clone(), tensor.clone()),
                    })
                    .collect();
                let samples = rng.gen_range(settings.min_samples..=settings.max_samples);
                (node, Shard { optimum, samples })
            })
            .collect();
        Self { shards }
    }

    /// Generates the shards from a dedicated stream of a seeded random source.
    pub fn seeded(nodes: &[NodeId], settings: &SimulationSettings, seed: u64) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        rng.set_stream(PARTITION_STREAM);
        Self::generate(nodes, settings, &mut rng)
    }

    pub fn shard(&self, node: NodeId) -> Option<&Shard> {
        self.shards.get(&node)
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Computes the sample-weighted mean loss of `state` over all shards.
    ///
    /// # Errors
    /// Fails if the partition is empty or the state doesn't fit the simulated model.
    pub fn loss(&self, state: &ModelState) -> Result<f64, TrainingError> {
        let mut total = 0.;
        let mut samples = 0;
        for shard in self.shards.values() {
            total += loss(state, &shard.optimum)? * shard.samples as f64;
            samples += shard.samples;
        }
        if samples == 0 {
            return Err(TrainingError("the partition is empty".into()));
        }
        Ok(total / samples as f64)
    }
}

/// Creates a state of the simulated model with float parameters drawn from
/// `[-scale, scale]`.
fn random_state<R>(dimensions: usize, scale: f64, rng: &mut R) -> ModelState
where
    R: Rng + ?Sized,
{
    let mut uniform = |shape: &[usize]| {
        ArrayD::from_shape_simple_fn(IxDyn(shape), || scale * rng.gen_range(-1.0..=1.0))
    };
    let mut state = ModelState::new();
    state.insert(WEIGHT, uniform(&[dimensions]));
    state.insert(BIAS, uniform(&[1]));
    state.insert(STEPS, arr0(0_i64).into_dyn());
    state
}

fn float_parameter<'a>(state: &'a ModelState, name: &str) -> Result<&'a ArrayD<f64>, TrainingError> {
    state
        .get(name)
        .and_then(Tensor::as_float)
        .ok_or_else(|| TrainingError(format!("missing float parameter `{}`", name)))
}

/// Computes `0.5 * ||state - optimum||²` over the float parameters of `optimum`.
fn loss(state: &ModelState, optimum: &ModelState) -> Result<f64, TrainingError> {
    let mut loss = 0.;
    for (name, target) in optimum {
        if let Tensor::Float(target) = target {
            let params = float_parameter(state, name)?;
            if params.shape() != target.shape() {
                return Err(TrainingError(format!("parameter `{}` has a wrong shape", name)));
            }
            loss += 0.5 * (params - target).mapv(|delta| delta * delta).sum();
        }
    }
    Ok(loss)
}

/// Local gradient descent on the shard of a node.
#[derive(Debug, Clone)]
pub struct QuadraticTrainer {
    partition: Arc<SyntheticPartition>,
    learning_rate: f64,
}

impl QuadraticTrainer {
    pub fn new(partition: Arc<SyntheticPartition>, learning_rate: f64) -> Self {
        Self {
            partition,
            learning_rate,
        }
    }
}

impl LocalTrainer for QuadraticTrainer {
    fn train(
        &self,
        node: NodeId,
        mut state: ModelState,
        task: &TrainingTask,
    ) -> Result<TrainingOutcome, TrainingError> {
        let shard = self
            .partition
            .shard(node)
            .ok_or_else(|| TrainingError(format!("node {} has no shard", node)))?;
        // the proximal term vanishes in the first step, it only pulls back later steps
        let mu = task.proximal_mu.unwrap_or(0.);

        for (name, target) in &shard.optimum {
            if let Tensor::Float(target) = target {
                let params = state
                    .get_mut(name)
                    .and_then(Tensor::as_float_mut)
                    .ok_or_else(|| TrainingError(format!("missing float parameter `{}`", name)))?;
                if params.shape() != target.shape() {
                    return Err(TrainingError(format!("parameter `{}` has a wrong shape", name)));
                }
                let start = params.clone();
                for _ in 0..task.local_epochs {
                    let gradient = (&*params - target) + (&*params - &start) * mu;
                    params.scaled_add(-self.learning_rate, &gradient);
                }
            }
        }
        if let Some(steps) = state.get_mut(STEPS).and_then(Tensor::as_int_mut) {
            steps.mapv_inplace(|steps| steps + i64::from(task.local_epochs));
        }

        let loss = loss(&state, &shard.optimum)?;
        Ok(TrainingOutcome {
            state,
            loss,
            samples: shard.samples,
        })
    }
}

/// Evaluates a model state on the union of all shards.
#[derive(Debug, Clone)]
pub struct QuadraticEvaluator {
    partition: Arc<SyntheticPartition>,
}

impl QuadraticEvaluator {
    pub fn new(partition: Arc<SyntheticPartition>) -> Self {
        Self { partition }
    }
}

impl Evaluator for QuadraticEvaluator {
    fn evaluate(&self, state: &ModelState) -> Result<f64, TrainingError> {
        self.partition.loss(state)
    }
}
