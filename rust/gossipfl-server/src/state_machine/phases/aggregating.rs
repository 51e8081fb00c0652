use std::{
    collections::{BTreeMap, BTreeSet},
    mem,
};

use gossipfl_core::NodeId;

use crate::{
    aggregation::LocalUpdate,
    report::NodeReport,
    state_machine::{
        phases::{Phase, PhaseError, PhaseName, PhaseState, RoundEnd, Shared},
        StateMachine,
    },
    store::NodeStateStore,
    training::TrainingOutcome,
};

/// The aggregating state.
///
/// Folds the trained states into a new node state store with the configured strategy. The new
/// store is handed to the round end and only published once the round completes.
#[derive(Debug)]
pub struct Aggregating {
    eligible: BTreeSet<NodeId>,
    epochs: BTreeMap<NodeId, u32>,
    outcomes: BTreeMap<NodeId, TrainingOutcome>,
    reports: Vec<NodeReport>,
    aggregated: Option<NodeStateStore>,
}

impl Aggregating {
    pub fn outcomes(&self) -> &BTreeMap<NodeId, TrainingOutcome> {
        &self.outcomes
    }
}

#[async_trait]
impl Phase for PhaseState<Aggregating> {
    const NAME: PhaseName = PhaseName::Aggregating;

    async fn process(&mut self) -> Result<(), PhaseError> {
        let outcomes = mem::take(&mut self.private.outcomes);
        let mut updates = BTreeMap::new();
        let mut reports = Vec::with_capacity(outcomes.len());
        for (node, outcome) in outcomes {
            let TrainingOutcome {
                state,
                loss,
                samples,
            } = outcome;
            reports.push(NodeReport {
                node,
                local_epochs: self.private.epochs.get(&node).copied().unwrap_or_default(),
                samples,
                loss,
            });
            updates.insert(node, LocalUpdate::new(state, samples));
        }

        info!(updates = updates.len(), "aggregating trained states");
        let aggregation = self
            .shared
            .strategy
            .aggregate(&self.shared.store, updates)?;
        for unknown in &aggregation.unknown_neighbors {
            warn!(node = unknown.node, neighbor = unknown.neighbor, "skipping unknown neighbor");
        }

        self.private.reports = reports;
        self.private.aggregated = Some(aggregation.store);
        Ok(())
    }

    fn next(self) -> StateMachine {
        let Aggregating {
            eligible,
            reports,
            aggregated,
            ..
        } = self.private;
        let aggregated = match aggregated {
            Some(aggregated) => aggregated,
            None => self.shared.store.as_ref().clone(),
        };
        PhaseState::<RoundEnd>::new(self.shared, eligible, reports, aggregated).into()
    }
}

impl PhaseState<Aggregating> {
    /// Creates a new aggregating state.
    pub fn new(
        shared: Shared,
        eligible: BTreeSet<NodeId>,
        epochs: BTreeMap<NodeId, u32>,
        outcomes: BTreeMap<NodeId, TrainingOutcome>,
    ) -> Self {
        Self {
            private: Aggregating {
                eligible,
                epochs,
                outcomes,
                reports: Vec::new(),
                aggregated: None,
            },
            shared,
        }
    }
}
