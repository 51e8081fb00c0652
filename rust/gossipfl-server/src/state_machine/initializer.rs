use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use thiserror::Error;

use gossipfl_core::{ModelState, NodeId, Topology};

use crate::{
    aggregation,
    settings::{AlgorithmSettings, TrainingSettings},
    state_machine::{
        coordinator::CoordinatorState,
        events::{EventPublisher, EventSubscriber},
        phases::{Idle, PhaseName, PhaseState, Shared},
        StateMachine,
    },
    store::NodeStateStore,
    training::{Evaluator, LocalTrainer},
};

type StateMachineInitializationResult<T> = Result<T, StateMachineInitializationError>;

/// Error that can occur during the initialization of the [`StateMachine`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateMachineInitializationError {
    #[error("the topology doesn't define any nodes")]
    NoNodes,
    #[error("the initial model state doesn't have any parameters")]
    EmptyInitialState,
}

/// The state machine initializer that initializes a new state machine.
pub struct StateMachineInitializer {
    training: TrainingSettings,
    algorithm: AlgorithmSettings,
    topology: Topology,
    initial_state: ModelState,
    trainer: Arc<dyn LocalTrainer>,
    evaluator: Option<Arc<dyn Evaluator>>,
}

impl StateMachineInitializer {
    /// Creates a new [`StateMachineInitializer`].
    ///
    /// The nodes of the `topology` form the domain of the node state store, every node starts
    /// with its own copy of `initial_state`.
    pub fn new(
        training: TrainingSettings,
        algorithm: AlgorithmSettings,
        topology: Topology,
        initial_state: ModelState,
        trainer: Arc<dyn LocalTrainer>,
    ) -> Self {
        Self {
            training,
            algorithm,
            topology,
            initial_state,
            trainer,
            evaluator: None,
        }
    }

    /// Enables the evaluation of the mean of all node states at the end of every round.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Initializes a new [`StateMachine`] in the [`Idle`] state.
    ///
    /// # Errors
    /// Fails if there are no nodes or the initial model state is empty.
    pub fn init(self) -> StateMachineInitializationResult<(StateMachine, EventSubscriber)> {
        let Self {
            training,
            algorithm,
            topology,
            initial_state,
            trainer,
            evaluator,
        } = self;

        let nodes = topology.nodes().collect::<Vec<NodeId>>();
        if nodes.is_empty() {
            return Err(StateMachineInitializationError::NoNodes);
        }
        if initial_state.is_empty() {
            return Err(StateMachineInitializationError::EmptyInitialState);
        }

        let store = NodeStateStore::init(nodes, &initial_state);
        for (node, neighbor) in topology.unknown_neighbors(&store.domain()) {
            warn!(node, neighbor, "topology references a node without model state");
        }
        if !topology.is_symmetric() {
            debug!("the topology is directed");
        }

        let strategy = aggregation::from_settings(&algorithm, topology);
        info!(
            algorithm = strategy.name(),
            nodes = store.len(),
            "initializing state machine"
        );

        let coordinator_state = CoordinatorState::new(&training);
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
            ChaCha20Rng::seed_from_u64(training.seed),
        );

        let state_machine = StateMachine::from(PhaseState::<Idle>::new(shared));
        Ok((state_machine, event_subscriber))
    }
}
