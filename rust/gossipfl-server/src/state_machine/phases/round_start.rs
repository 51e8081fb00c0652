use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use gossipfl_core::NodeId;

use crate::{
    dispatcher,
    state_machine::{
        events::{EligibleUpdate, ReportUpdate},
        phases::{Dispatching, Phase, PhaseError, PhaseName, PhaseState, Shared},
        StateMachine,
    },
};

/// The round start state.
///
/// Selects the eligible nodes of the round and draws their number of local epochs.
#[derive(Debug, Default)]
pub struct RoundStart {
    eligible: BTreeSet<NodeId>,
    epochs: BTreeMap<NodeId, u32>,
}

#[async_trait]
impl Phase for PhaseState<RoundStart> {
    const NAME: PhaseName = PhaseName::RoundStart;

    async fn process(&mut self) -> Result<(), PhaseError> {
        let Shared {
            state,
            store,
            strategy,
            rng,
            ..
        } = &mut self.shared;

        let nodes = store.nodes().collect::<Vec<_>>();
        let eligible = dispatcher::select_eligible(&nodes, state.participation, rng);
        info!(eligible = ?eligible, "selected eligible nodes");

        let schedule = strategy.epoch_schedule(state.local_epochs);
        self.private.epochs = eligible
            .iter()
            .map(|&node| (node, schedule.sample(rng)))
            .collect();
        debug!(epochs = ?self.private.epochs, "sampled local epochs");
        self.private.eligible = eligible;

        Ok(())
    }

    fn broadcast(&mut self) {
        info!("broadcasting eligible nodes");
        let eligible = Arc::new(self.private.eligible.clone());
        self.shared
            .events
            .broadcast_eligible(EligibleUpdate::New(eligible));

        info!("broadcasting invalidation of the round report from the previous round");
        self.shared.events.broadcast_report(ReportUpdate::Invalidate);
    }

    fn next(self) -> StateMachine {
        let RoundStart { eligible, epochs } = self.private;
        PhaseState::<Dispatching>::new(self.shared, eligible, epochs).into()
    }
}

impl PhaseState<RoundStart> {
    /// Creates a new round start state.
    pub fn new(mut shared: Shared) -> Self {
        // Since the phase event of this phase belongs to the new round, the round id must be
        // updated before the phase runs.
        shared.set_round_id(shared.round_id() + 1);
        debug!("new round ID = {}", shared.round_id());
        Self {
            private: RoundStart::default(),
            shared,
        }
    }
}
