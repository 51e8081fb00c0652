use std::{
    collections::{BTreeMap, BTreeSet},
    mem,
};

use tokio::task;

use gossipfl_core::NodeId;

use crate::{
    state_machine::{
        phases::{Collecting, Phase, PhaseError, PhaseName, PhaseState, Shared},
        StateMachine,
    },
    training::{self, TrainingJob, TrainingOutcome},
};

/// The training state.
///
/// Hands the training jobs to the local training collaborator. The jobs run in parallel on the
/// rayon thread pool, off the async runtime. Failed jobs are logged and leave their node
/// without a result.
#[derive(Debug)]
pub struct Training {
    eligible: BTreeSet<NodeId>,
    epochs: BTreeMap<NodeId, u32>,
    jobs: Vec<TrainingJob>,
    outcomes: BTreeMap<NodeId, TrainingOutcome>,
}

impl Training {
    pub fn jobs(&self) -> &[TrainingJob] {
        &self.jobs
    }
}

#[async_trait]
impl Phase for PhaseState<Training> {
    const NAME: PhaseName = PhaseName::Training;

    async fn process(&mut self) -> Result<(), PhaseError> {
        let trainer = self.shared.trainer.clone();
        let jobs = mem::take(&mut self.private.jobs);
        info!(jobs = jobs.len(), "starting local training");

        let results = task::spawn_blocking(move || training::train_all(trainer.as_ref(), jobs))
            .await
            .map_err(PhaseError::Training)?;

        for (node, result) in results {
            match result {
                Ok(outcome) => {
                    debug!(node, loss = outcome.loss, "local training finished");
                    self.private.outcomes.insert(node, outcome);
                }
                Err(err) => warn!(node, "{}", err),
            }
        }

        Ok(())
    }

    fn next(self) -> StateMachine {
        let Training {
            eligible,
            epochs,
            outcomes,
            ..
        } = self.private;
        PhaseState::<Collecting>::new(self.shared, eligible, epochs, outcomes).into()
    }
}

impl PhaseState<Training> {
    /// Creates a new training state.
    pub fn new(
        shared: Shared,
        eligible: BTreeSet<NodeId>,
        epochs: BTreeMap<NodeId, u32>,
        jobs: Vec<TrainingJob>,
    ) -> Self {
        Self {
            private: Training {
                eligible,
                epochs,
                jobs,
                outcomes: BTreeMap::new(),
            },
            shared,
        }
    }
}

#[cfg(test)]
mod tests {
    use gossipfl_core::testutils::{shifted, toy_state};

    use super::*;
    use crate::{
        state_machine::tests::{builder::StateMachineBuilder, utils},
        training::{MockLocalTrainer, TrainingError, TrainingTask},
    };

    fn job(node: NodeId) -> TrainingJob {
        TrainingJob {
            node,
            state: toy_state(0.),
            task: TrainingTask {
                local_epochs: 2,
                proximal_mu: None,
            },
        }
    }

    fn training(jobs: Vec<TrainingJob>) -> Training {
        Training {
            eligible: jobs.iter().map(|job| job.node).collect(),
            epochs: jobs
                .iter()
                .map(|job| (job.node, job.task.local_epochs))
                .collect(),
            jobs,
            outcomes: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_training_to_collecting() {
        let store = utils::shifted_store(&[(0, 0.), (1, 0.)]);
        let (state_machine, _events) = StateMachineBuilder::new(store)
            .with_trainer(utils::AdditiveTrainer::new(&[(0, 1.), (1, 2.)]))
            .with_phase(training(vec![job(0), job(1)]))
            .build();
        assert!(state_machine.is_training());

        let collecting = state_machine.next().await.into_collecting_phase_state();
        let outcomes = collecting.private.outcomes();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[&0].state, shifted(&toy_state(0.), 1.));
        assert_eq!(outcomes[&1].state, shifted(&toy_state(0.), 2.));
    }

    #[tokio::test]
    async fn test_failed_job_leaves_node_without_result() {
        let mut trainer = MockLocalTrainer::new();
        trainer.expect_train().times(2).returning(|node, state, _| {
            if node == 1 {
                Err(TrainingError("diverged".into()))
            } else {
                Ok(TrainingOutcome {
                    state,
                    loss: 0.,
                    samples: 1,
                })
            }
        });
        let store = utils::shifted_store(&[(0, 0.), (1, 0.)]);
        let (state_machine, _events) = StateMachineBuilder::new(store)
            .with_trainer(trainer)
            .with_phase(training(vec![job(0), job(1)]))
            .build();

        let collecting = state_machine.next().await.into_collecting_phase_state();
        assert!(collecting.private.outcomes().contains_key(&0));
        assert!(!collecting.private.outcomes().contains_key(&1));
    }
}
