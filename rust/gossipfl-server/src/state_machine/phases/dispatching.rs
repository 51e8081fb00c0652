use std::collections::{BTreeMap, BTreeSet};

use gossipfl_core::NodeId;

use crate::{
    dispatcher,
    state_machine::{
        phases::{Phase, PhaseError, PhaseName, PhaseState, Shared, Training},
        StateMachine,
    },
    training::{TrainingJob, TrainingTask},
};

/// The dispatching state.
///
/// Copies the own model state of every eligible node out of the store and wraps it into a
/// training job.
#[derive(Debug)]
pub struct Dispatching {
    eligible: BTreeSet<NodeId>,
    epochs: BTreeMap<NodeId, u32>,
    jobs: Vec<TrainingJob>,
}

impl Dispatching {
    pub fn eligible(&self) -> &BTreeSet<NodeId> {
        &self.eligible
    }

    /// Gets the number of local epochs drawn for an eligible node.
    pub fn local_epochs(&self, node: NodeId) -> Option<u32> {
        self.epochs.get(&node).copied()
    }
}

#[async_trait]
impl Phase for PhaseState<Dispatching> {
    const NAME: PhaseName = PhaseName::Dispatching;

    async fn process(&mut self) -> Result<(), PhaseError> {
        let proximal_mu = self.shared.strategy.proximal_mu();
        let default_epochs = self.shared.state.local_epochs;
        let epochs = &self.private.epochs;

        self.private.jobs = dispatcher::dispatch(&self.private.eligible, &self.shared.store)
            .into_iter()
            .map(|(node, state)| TrainingJob {
                node,
                state,
                task: TrainingTask {
                    local_epochs: epochs.get(&node).copied().unwrap_or(default_epochs),
                    proximal_mu,
                },
            })
            .collect();
        info!(jobs = self.private.jobs.len(), "dispatched model states");

        Ok(())
    }

    fn next(self) -> StateMachine {
        let Dispatching {
            eligible,
            epochs,
            jobs,
        } = self.private;
        PhaseState::<Training>::new(self.shared, eligible, epochs, jobs).into()
    }
}

impl PhaseState<Dispatching> {
    /// Creates a new dispatching state.
    pub fn new(
        shared: Shared,
        eligible: BTreeSet<NodeId>,
        epochs: BTreeMap<NodeId, u32>,
    ) -> Self {
        Self {
            private: Dispatching {
                eligible,
                epochs,
                jobs: Vec::new(),
            },
            shared,
        }
    }
}
