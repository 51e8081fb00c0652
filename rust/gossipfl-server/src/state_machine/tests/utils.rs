use std::{collections::BTreeMap, sync::Arc};

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing_subscriber::*;

use gossipfl_core::{
    testutils::{shifted, toy_state},
    ModelState,
    NodeId,
    Topology,
};

use crate::{
    aggregation::{GossipAggregator, Strategy},
    state_machine::{
        coordinator::CoordinatorState,
        events::{EventPublisher, EventSubscriber},
        phases::{PhaseName, Shared},
    },
    store::NodeStateStore,
    training::{Evaluator, LocalTrainer, TrainingError, TrainingOutcome, TrainingTask},
};

pub fn enable_logging() {
    let _fmt_subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(true)
        .try_init();
}

pub fn coordinator_state(rounds: u64) -> CoordinatorState {
    CoordinatorState {
        round_id: 0,
        rounds,
        participation: 1.,
        local_epochs: 1,
    }
}

/// Creates a store in which every node holds the toy state shifted by its delta.
pub fn shifted_store(nodes: &[(NodeId, f64)]) -> NodeStateStore {
    let s0 = toy_state(0.);
    nodes
        .iter()
        .map(|&(node, delta)| (node, shifted(&s0, delta)))
        .collect()
}

/// The topology `{0: [1], 1: [0, 2], 2: [1]}`.
pub fn line_topology() -> Topology {
    Topology::new(vec![(0, vec![1]), (1, vec![0, 2]), (2, vec![1])]).unwrap()
}

/// A trainer which adds a fixed per-node delta to all float parameters, independent of the
/// number of local epochs.
#[derive(Debug, Clone)]
pub struct AdditiveTrainer {
    deltas: BTreeMap<NodeId, f64>,
    fallback: Option<f64>,
}

impl AdditiveTrainer {
    /// Creates a trainer which fails for nodes without a delta.
    pub fn new(deltas: &[(NodeId, f64)]) -> Self {
        Self {
            deltas: deltas.iter().copied().collect(),
            fallback: None,
        }
    }

    /// Creates a trainer which adds the same delta for every node.
    pub fn uniform(delta: f64) -> Self {
        Self {
            deltas: BTreeMap::new(),
            fallback: Some(delta),
        }
    }
}

impl LocalTrainer for AdditiveTrainer {
    fn train(
        &self,
        node: NodeId,
        state: ModelState,
        _task: &TrainingTask,
    ) -> Result<TrainingOutcome, TrainingError> {
        let delta = self
            .deltas
            .get(&node)
            .copied()
            .or(self.fallback)
            .ok_or_else(|| TrainingError(format!("no delta for node {}", node)))?;
        Ok(TrainingOutcome {
            state: shifted(&state, delta),
            loss: delta.abs(),
            samples: 10,
        })
    }
}

pub fn init_shared(coordinator_state: CoordinatorState) -> (Shared, EventSubscriber) {
    init_shared_with(
        coordinator_state,
        shifted_store(&[(0, 0.), (1, 0.), (2, 0.)]),
        Box::new(GossipAggregator::new(Topology::empty())),
        Arc::new(AdditiveTrainer::uniform(1.)),
        None,
        0,
    )
}

pub fn init_shared_with(
    coordinator_state: CoordinatorState,
    store: NodeStateStore,
    strategy: Box<dyn Strategy>,
    trainer: Arc<dyn LocalTrainer>,
    evaluator: Option<Arc<dyn Evaluator>>,
    seed: u64,
) -> (Shared, EventSubscriber) {
    let store = Arc::new(store);
    let (event_publisher, event_subscriber) = EventPublisher::init(
        coordinator_state.round_id,
        coordinator_state,
        PhaseName::Idle,
        store.clone(),
    );
    let shared = Shared::new(
        coordinator_state,
        event_publisher,
        store,
        strategy,
        trainer,
        evaluator,
        ChaCha20Rng::seed_from_u64(seed),
    );
    (shared, event_subscriber)
}
