use thiserror::Error;
use tokio::task::JoinError;

use gossipfl_core::ShapeMismatchError;

use crate::{
    aggregation::AggregationError,
    dispatcher::IncompleteRoundError,
    state_machine::{
        events::EligibleUpdate,
        phases::{Done, Phase, PhaseName, PhaseState, Shared},
        StateMachine,
    },
    training::TrainingError,
};

/// Errors which can occur during the execution of the [`StateMachine`].
#[derive(Error, Debug)]
pub enum PhaseError {
    #[error("local training was aborted: {0}")]
    Training(#[source] JoinError),
    #[error("collecting phase failed: {0}")]
    Collecting(#[from] IncompleteRoundError),
    #[error("aggregating phase failed: {0}")]
    Aggregation(#[from] AggregationError),
    #[error("global model is unavailable: {0}")]
    GlobalModel(#[source] ShapeMismatchError),
    #[error("global evaluation failed: {0}")]
    Evaluation(#[from] TrainingError),
    #[error("the run was interrupted")]
    Interrupted,
}

/// The failure state.
///
/// Runs are never retried: a failure ends the run, the store of the last completed round stays
/// in place.
#[derive(Debug)]
pub struct Failure {
    error: PhaseError,
}

impl Failure {
    pub fn error(&self) -> &PhaseError {
        &self.error
    }
}

#[async_trait]
impl Phase for PhaseState<Failure> {
    const NAME: PhaseName = PhaseName::Failure;

    async fn process(&mut self) -> Result<(), PhaseError> {
        error!("phase state error: {}", self.private.error);
        Ok(())
    }

    fn broadcast(&mut self) {
        info!("broadcasting invalidation of the eligible nodes");
        self.shared
            .events
            .broadcast_eligible(EligibleUpdate::Invalidate);
    }

    fn next(self) -> StateMachine {
        PhaseState::<Done>::new(self.shared, Some(self.private.error)).into()
    }
}

impl PhaseState<Failure> {
    /// Creates a new failure phase.
    pub fn new(shared: Shared, error: PhaseError) -> Self {
        Self {
            private: Failure { error },
            shared,
        }
    }
}
