use std::{collections::BTreeSet, mem, sync::Arc};

use gossipfl_core::NodeId;

use crate::{
    report::{NodeReport, RoundReport},
    store::NodeStateStore,
    state_machine::{
        events::ReportUpdate,
        phases::{Done, Phase, PhaseError, PhaseName, PhaseState, RoundStart, Shared},
        StateMachine,
    },
};

/// The round end state.
///
/// Evaluates the mean of the aggregated node states if global evaluation is enabled, records the
/// report of the round and publishes the aggregated store. A failed evaluation leaves the store
/// of the previous round in place.
#[derive(Debug)]
pub struct RoundEnd {
    eligible: BTreeSet<NodeId>,
    nodes: Vec<NodeReport>,
    aggregated: NodeStateStore,
    report: Option<Arc<RoundReport>>,
}

impl RoundEnd {
    /// Gets the local metrics of the eligible nodes.
    pub fn node_reports(&self) -> &[NodeReport] {
        &self.nodes
    }

    /// Gets the node state store aggregated in this round.
    pub fn aggregated(&self) -> &NodeStateStore {
        &self.aggregated
    }
}

#[async_trait]
impl Phase for PhaseState<RoundEnd> {
    const NAME: PhaseName = PhaseName::RoundEnd;

    async fn process(&mut self) -> Result<(), PhaseError> {
        let global_loss = match &self.shared.evaluator {
            Some(evaluator) => {
                let mean = self
                    .private
                    .aggregated
                    .mean_state()
                    .map_err(PhaseError::GlobalModel)?;
                let loss = evaluator.evaluate(&mean)?;
                info!(loss, "evaluated global model");
                Some(loss)
            }
            None => None,
        };

        let report = RoundReport {
            round_id: self.shared.round_id(),
            eligible: self.private.eligible.clone(),
            nodes: mem::take(&mut self.private.nodes),
            global_loss,
        };
        info!(
            mean_local_loss = ?report.mean_local_loss(),
            global_loss = ?report.global_loss,
            "round completed"
        );
        self.shared.history.push(report.clone());
        self.private.report = Some(Arc::new(report));

        let aggregated = mem::take(&mut self.private.aggregated);
        self.shared.publish_store(aggregated);

        Ok(())
    }

    fn broadcast(&mut self) {
        if let Some(report) = self.private.report.take() {
            info!("broadcasting round report");
            self.shared
                .events
                .broadcast_report(ReportUpdate::New(report));
        }
    }

    fn next(self) -> StateMachine {
        if self.shared.state.is_last_round() {
            info!("all rounds completed");
            PhaseState::<Done>::new(self.shared, None).into()
        } else {
            PhaseState::<RoundStart>::new(self.shared).into()
        }
    }
}

impl PhaseState<RoundEnd> {
    /// Creates a new round end state.
    pub fn new(
        shared: Shared,
        eligible: BTreeSet<NodeId>,
        nodes: Vec<NodeReport>,
        aggregated: NodeStateStore,
    ) -> Self {
        Self {
            private: RoundEnd {
                eligible,
                nodes,
                aggregated,
                report: None,
            },
            shared,
        }
    }
}

#[cfg(test)]
mod tests {
    use gossipfl_core::{
        testutils::{shifted, toy_state},
        ModelState,
    };

    use super::*;
    use crate::{
        state_machine::tests::{builder::StateMachineBuilder, utils},
        training::{Evaluator, TrainingError},
    };

    /// Evaluates a state by the value of its first weight.
    struct FirstWeight;

    impl Evaluator for FirstWeight {
        fn evaluate(&self, state: &ModelState) -> Result<f64, TrainingError> {
            state
                .get("linear.weight")
                .and_then(|tensor| tensor.as_float())
                .and_then(|weight| weight.iter().next().copied())
                .ok_or_else(|| TrainingError("no weight".into()))
        }
    }

    fn round_end(aggregated: NodeStateStore) -> RoundEnd {
        RoundEnd {
            eligible: vec![0].into_iter().collect(),
            nodes: vec![NodeReport {
                node: 0,
                local_epochs: 1,
                samples: 4,
                loss: 0.25,
            }],
            aggregated,
            report: None,
        }
    }

    #[tokio::test]
    async fn test_round_end_to_round_start() {
        let store = utils::shifted_store(&[(0, 0.), (1, 0.)]);
        let aggregated = utils::shifted_store(&[(0, 1.), (1, 3.)]);
        let (state_machine, events) = StateMachineBuilder::new(store)
            .with_round_id(1)
            .with_rounds(3)
            .with_phase(round_end(aggregated.clone()))
            .build();
        assert!(state_machine.is_round_end());

        let round_start = state_machine.next().await.into_round_start_phase_state();
        assert_eq!(round_start.shared.round_id(), 2);
        assert_eq!(round_start.shared.history.rounds.len(), 1);
        assert_eq!(round_start.shared.store.as_ref(), &aggregated);
        assert_eq!(
            events.store_listener().get_latest().event.as_ref(),
            &aggregated
        );

        let expected = RoundReport {
            round_id: 1,
            eligible: vec![0].into_iter().collect(),
            nodes: round_end(NodeStateStore::default()).nodes,
            global_loss: None,
        };
        assert_eq!(round_start.shared.history.last(), Some(&expected));
        assert_eq!(
            events.report_listener().get_latest().event,
            ReportUpdate::New(Arc::new(expected))
        );
    }

    #[tokio::test]
    async fn test_last_round_end_to_done() {
        let store = utils::shifted_store(&[(0, 0.), (1, 0.)]);
        let aggregated = utils::shifted_store(&[(0, 1.), (1, 3.)]);
        let (state_machine, _events) = StateMachineBuilder::new(store)
            .with_round_id(3)
            .with_rounds(3)
            .with_evaluator(FirstWeight)
            .with_phase(round_end(aggregated))
            .build();

        let done = state_machine.next().await.into_done_phase_state();
        let report = done.shared.history.last().unwrap();
        assert_eq!(report.round_id, 3);
        // the mean of both aggregated node states
        assert_eq!(report.global_loss, Some(2.));
    }

    #[tokio::test]
    async fn test_failed_evaluation() {
        let store = utils::shifted_store(&[(0, 0.), (1, 0.)]);
        // node 1 holds a state without any parameters
        let aggregated = vec![(0, shifted(&toy_state(0.), 1.)), (1, ModelState::new())]
            .into_iter()
            .collect();
        let (state_machine, events) = StateMachineBuilder::new(store.clone())
            .with_evaluator(FirstWeight)
            .with_phase(round_end(aggregated))
            .build();

        let failure = state_machine.next().await.into_failure_phase_state();
        assert!(matches!(failure.private.error(), PhaseError::GlobalModel(_)));
        assert!(failure.shared.history.rounds.is_empty());
        // the aggregated store of the failed round is dropped
        assert_eq!(failure.shared.store.as_ref(), &store);
        assert_eq!(events.store_listener().get_latest().event.as_ref(), &store);
    }
}
