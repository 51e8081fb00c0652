use std::{
    collections::{BTreeMap, BTreeSet},
    mem,
};

use gossipfl_core::NodeId;

use crate::{
    dispatcher,
    state_machine::{
        phases::{Aggregating, Phase, PhaseError, PhaseName, PhaseState, Shared},
        StateMachine,
    },
    training::TrainingOutcome,
};

/// The collecting state.
///
/// Checks that every eligible node returned a trained state.
#[derive(Debug)]
pub struct Collecting {
    eligible: BTreeSet<NodeId>,
    epochs: BTreeMap<NodeId, u32>,
    outcomes: BTreeMap<NodeId, TrainingOutcome>,
}

impl Collecting {
    pub fn outcomes(&self) -> &BTreeMap<NodeId, TrainingOutcome> {
        &self.outcomes
    }
}

#[async_trait]
impl Phase for PhaseState<Collecting> {
    const NAME: PhaseName = PhaseName::Collecting;

    async fn process(&mut self) -> Result<(), PhaseError> {
        let outcomes = mem::take(&mut self.private.outcomes);
        self.private.outcomes = dispatcher::collect(&self.private.eligible, outcomes)?;
        info!(results = self.private.outcomes.len(), "collected trained states");
        Ok(())
    }

    fn next(self) -> StateMachine {
        let Collecting {
            eligible,
            epochs,
            outcomes,
        } = self.private;
        PhaseState::<Aggregating>::new(self.shared, eligible, epochs, outcomes).into()
    }
}

impl PhaseState<Collecting> {
    /// Creates a new collecting state.
    pub fn new(
        shared: Shared,
        eligible: BTreeSet<NodeId>,
        epochs: BTreeMap<NodeId, u32>,
        outcomes: BTreeMap<NodeId, TrainingOutcome>,
    ) -> Self {
        Self {
            private: Collecting {
                eligible,
                epochs,
                outcomes,
            },
            shared,
        }
    }
}
