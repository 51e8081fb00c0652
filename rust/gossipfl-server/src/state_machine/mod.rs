//! The state machine that drives the rounds of a federated learning run.
//!
//! # Overview
//!
//! ```text
//! Idle -> RoundStart -> Dispatching -> Training -> Collecting -> Aggregating -> RoundEnd
//!             ^                                                                    |
//!             +----------------------------- next round ---------------------------+
//!
//! RoundEnd (last round) -> Done
//! any phase (on error)  -> Failure -> Done
//! ```
//!
//! The [`StateMachine`] runs a fixed number of rounds. In every round it selects the eligible
//! nodes, hands their own model states to the local training collaborator and folds the trained
//! states into the node state store with the configured aggregation [`Strategy`]. The phases of
//! a round run strictly one after the other, only the local training of the eligible nodes runs
//! in parallel.
//!
//! Furthermore, the [`StateMachine`] publishes run events and handles errors.
//!
//! # Phase states
//!
//! **Idle**
//!
//! Publishes [`PhaseName::Idle`], the run parameters and the initial node state store.
//!
//! **RoundStart**
//!
//! Publishes [`PhaseName::RoundStart`], increments the `round id` by `1`, selects and publishes
//! the eligible nodes and draws their number of local epochs from the seeded random source.
//!
//! **Dispatching**
//!
//! Publishes [`PhaseName::Dispatching`] and copies the own model state of every eligible node out
//! of the store.
//!
//! **Training**
//!
//! Publishes [`PhaseName::Training`] and trains the dispatched states locally, in parallel.
//!
//! **Collecting**
//!
//! Publishes [`PhaseName::Collecting`] and ensures that every eligible node returned a trained
//! state.
//!
//! **Aggregating**
//!
//! Publishes [`PhaseName::Aggregating`] and aggregates the trained states into a new node state
//! store.
//!
//! **RoundEnd**
//!
//! Publishes [`PhaseName::RoundEnd`], optionally evaluates the mean of the new node states, records
//! and publishes the [`RoundReport`] and replaces the node state store. The store is replaced as a
//! whole or not at all.
//!
//! **Failure**
//!
//! Publishes [`PhaseName::Failure`] and logs the [`PhaseError`]. Rounds are never retried, the
//! run ends.
//!
//! **Done**
//!
//! Publishes [`PhaseName::Done`] and hands out the final store and the run history, or the error
//! of a failed run.
//!
//! [`Strategy`]: crate::aggregation::Strategy
//! [`RoundReport`]: crate::report::RoundReport

pub mod coordinator;
pub mod events;
pub mod initializer;
pub mod phases;
#[cfg(test)]
pub(crate) mod tests;

pub use self::initializer::{StateMachineInitializationError, StateMachineInitializer};

use std::future::{self, Future};

use derive_more::From;
use thiserror::Error;

use gossipfl_core::RoundId;

use self::phases::{
    Aggregating,
    Collecting,
    Dispatching,
    Done,
    Failure,
    Idle,
    PhaseError,
    PhaseName,
    PhaseState,
    RoundEnd,
    RoundStart,
    Training,
};
use crate::{report::RunHistory, store::NodeStateStore};

/// The state machine with all its states.
#[derive(From)]
pub enum StateMachine {
    Idle(PhaseState<Idle>),
    RoundStart(PhaseState<RoundStart>),
    Dispatching(PhaseState<Dispatching>),
    Training(PhaseState<Training>),
    Collecting(PhaseState<Collecting>),
    Aggregating(PhaseState<Aggregating>),
    RoundEnd(PhaseState<RoundEnd>),
    Failure(PhaseState<Failure>),
    Done(PhaseState<Done>),
}

/// The outcome of a successful run.
#[derive(Debug)]
pub struct RunSummary {
    /// The node state store after the last round.
    pub store: NodeStateStore,
    /// The reports of all rounds.
    pub history: RunHistory,
}

#[derive(Error, Debug)]
#[error("round {round_id} failed: {error}")]
/// The outcome of a failed run.
pub struct RunError {
    /// The round in which the run failed.
    pub round_id: RoundId,
    #[source]
    pub error: PhaseError,
    /// The node state store after the last completed round.
    pub store: NodeStateStore,
    /// The reports of all completed rounds.
    pub history: RunHistory,
}

impl StateMachine {
    /// Moves the [`StateMachine`] to the next state and consumes the current one.
    ///
    /// The [`Done`] state has no successor and is returned unchanged.
    pub async fn next(self) -> Self {
        match self {
            StateMachine::Idle(state) => state.run_phase().await,
            StateMachine::RoundStart(state) => state.run_phase().await,
            StateMachine::Dispatching(state) => state.run_phase().await,
            StateMachine::Training(state) => state.run_phase().await,
            StateMachine::Collecting(state) => state.run_phase().await,
            StateMachine::Aggregating(state) => state.run_phase().await,
            StateMachine::RoundEnd(state) => state.run_phase().await,
            StateMachine::Failure(state) => state.run_phase().await,
            StateMachine::Done(state) => state.into(),
        }
    }

    /// Gets the name of the current state.
    pub fn phase(&self) -> PhaseName {
        match self {
            StateMachine::Idle(_) => PhaseName::Idle,
            StateMachine::RoundStart(_) => PhaseName::RoundStart,
            StateMachine::Dispatching(_) => PhaseName::Dispatching,
            StateMachine::Training(_) => PhaseName::Training,
            StateMachine::Collecting(_) => PhaseName::Collecting,
            StateMachine::Aggregating(_) => PhaseName::Aggregating,
            StateMachine::RoundEnd(_) => PhaseName::RoundEnd,
            StateMachine::Failure(_) => PhaseName::Failure,
            StateMachine::Done(_) => PhaseName::Done,
        }
    }

    /// Runs the state machine until all rounds are completed or a round fails.
    ///
    /// # Errors
    /// Fails with the first error of any phase.
    pub async fn run(self) -> Result<RunSummary, RunError> {
        self.run_until(future::pending()).await
    }

    /// Runs the state machine until all rounds are completed, a round fails or `shutdown`
    /// resolves.
    ///
    /// A running phase is never cancelled. Once `shutdown` resolves the run moves into the
    /// failure state at the next phase transition and keeps the store and the reports of all
    /// completed rounds.
    ///
    /// # Errors
    /// Fails with the first error of any phase or with [`PhaseError::Interrupted`].
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<RunSummary, RunError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut interrupted = false;
        loop {
            if interrupted {
                self = self.interrupt();
            }
            let state = match self {
                StateMachine::Done(state) => return state.finish(),
                state => state,
            };

            let next = state.next();
            tokio::pin!(next);
            self = loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown, if !interrupted => {
                        warn!("interrupted, stopping after the current phase");
                        interrupted = true;
                    }
                    state = &mut next => break state,
                }
            };
        }
    }

    /// Moves a running state into the failure state.
    fn interrupt(self) -> Self {
        match self {
            StateMachine::Idle(state) => state.into_failure_state(PhaseError::Interrupted),
            StateMachine::RoundStart(state) => state.into_failure_state(PhaseError::Interrupted),
            StateMachine::Dispatching(state) => state.into_failure_state(PhaseError::Interrupted),
            StateMachine::Training(state) => state.into_failure_state(PhaseError::Interrupted),
            StateMachine::Collecting(state) => state.into_failure_state(PhaseError::Interrupted),
            StateMachine::Aggregating(state) => state.into_failure_state(PhaseError::Interrupted),
            StateMachine::RoundEnd(state) => state.into_failure_state(PhaseError::Interrupted),
            state @ StateMachine::Failure(_) | state @ StateMachine::Done(_) => state,
        }
    }
}
