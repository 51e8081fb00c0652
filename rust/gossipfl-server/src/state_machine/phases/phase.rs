use std::{fmt, sync::Arc};

use derive_more::Display;
use rand_chacha::ChaCha20Rng;
use tracing_futures::Instrument;

use gossipfl_core::RoundId;

use crate::{
    aggregation::Strategy,
    report::RunHistory,
    state_machine::{
        coordinator::CoordinatorState,
        events::EventPublisher,
        phases::{Failure, PhaseError},
        StateMachine,
    },
    store::NodeStateStore,
    training::{Evaluator, LocalTrainer},
};

/// The name of the current phase.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum PhaseName {
    #[display(fmt = "Idle")]
    Idle,
    #[display(fmt = "RoundStart")]
    RoundStart,
    #[display(fmt = "Dispatching")]
    Dispatching,
    #[display(fmt = "Training")]
    Training,
    #[display(fmt = "Collecting")]
    Collecting,
    #[display(fmt = "Aggregating")]
    Aggregating,
    #[display(fmt = "RoundEnd")]
    RoundEnd,
    #[display(fmt = "Failure")]
    Failure,
    #[display(fmt = "Done")]
    Done,
}

/// A trait that must be implemented by a state in order to move to a next state.
///
/// See the [module level documentation] for more details.
///
/// [module level documentation]: crate::state_machine
#[async_trait]
pub trait Phase {
    /// The name of the current phase.
    const NAME: PhaseName;

    /// Performs the tasks of this phase.
    async fn process(&mut self) -> Result<(), PhaseError>;

    /// Broadcasts data of this phase (nothing by default).
    fn broadcast(&mut self) {}

    /// Moves from this phase to the next phase.
    fn next(self) -> StateMachine;
}

/// A struct that contains the coordinator state and the collaborators that are shared and
/// accessible by all `PhaseState`s.
pub struct Shared {
    /// The coordinator state.
    pub(in crate::state_machine) state: CoordinatorState,
    /// The event publisher.
    pub(in crate::state_machine) events: EventPublisher,
    /// The model states of all nodes as of the last completed round.
    pub(in crate::state_machine) store: Arc<NodeStateStore>,
    /// The aggregation strategy.
    pub(in crate::state_machine) strategy: Box<dyn Strategy>,
    /// The local training collaborator.
    pub(in crate::state_machine) trainer: Arc<dyn LocalTrainer>,
    /// The optional global evaluation collaborator.
    pub(in crate::state_machine) evaluator: Option<Arc<dyn Evaluator>>,
    /// The seeded source of all round randomness.
    pub(in crate::state_machine) rng: ChaCha20Rng,
    /// The reports of all completed rounds.
    pub(in crate::state_machine) history: RunHistory,
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("state", &self.state)
            .field("events", &self.events)
            .field("nodes", &self.store.len())
            .field("strategy", &self.strategy)
            .field("evaluator", &self.evaluator.is_some())
            .field("rounds_completed", &self.history.rounds.len())
            .finish()
    }
}

impl Shared {
    /// Creates a new shared state.
    pub fn new(
        coordinator_state: CoordinatorState,
        publisher: EventPublisher,
        store: Arc<NodeStateStore>,
        strategy: Box<dyn Strategy>,
        trainer: Arc<dyn LocalTrainer>,
        evaluator: Option<Arc<dyn Evaluator>>,
        rng: ChaCha20Rng,
    ) -> Self {
        let history = RunHistory::new(strategy.name());
        Self {
            state: coordinator_state,
            events: publisher,
            store,
            strategy,
            trainer,
            evaluator,
            rng,
            history,
        }
    }

    /// Sets the round ID to the given value.
    pub fn set_round_id(&mut self, id: RoundId) {
        self.state.round_id = id;
        self.events.set_round_id(id);
    }

    /// Returns the current round ID.
    pub fn round_id(&self) -> RoundId {
        self.state.round_id
    }

    /// Replaces the node state store as a whole and publishes it.
    pub(in crate::state_machine) fn publish_store(&mut self, store: NodeStateStore) {
        self.store = Arc::new(store);
        self.events.broadcast_store(self.store.clone());
    }
}

/// The state corresponding to a phase of a round.
///
/// This contains the state-dependent `private` state and the state-independent `shared` state
/// which is shared across state transitions.
pub struct PhaseState<S> {
    /// The private state.
    pub(in crate::state_machine) private: S,
    /// The shared coordinator state and collaborators.
    pub(in crate::state_machine) shared: Shared,
}

impl<S> PhaseState<S>
where
    S: Send,
    Self: Phase,
{
    /// Runs the current phase to completion.
    ///
    /// 1. Performs the phase tasks.
    /// 2. Broadcasts the phase data.
    /// 3. Transitions to the next phase.
    pub async fn run_phase(mut self) -> StateMachine {
        let phase = Self::NAME;
        let span = error_span!("run_phase", phase = %phase, round_id = self.shared.round_id());

        async move {
            info!("starting phase");
            self.shared.events.broadcast_phase(phase);

            if let Err(err) = self.process().await {
                warn!("failed to perform the phase tasks");
                return self.into_failure_state(err);
            }
            info!("phase ran successfully");

            self.broadcast();

            info!("transitioning to the next phase");
            self.next()
        }
        .instrument(span)
        .await
    }
}

impl<S> PhaseState<S> {
    pub(in crate::state_machine) fn into_failure_state(self, err: PhaseError) -> StateMachine {
        PhaseState::<Failure>::new(self.shared, err).into()
    }
}
