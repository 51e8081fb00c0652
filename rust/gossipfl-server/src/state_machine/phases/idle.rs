use crate::state_machine::{
    events::{EligibleUpdate, ReportUpdate},
    phases::{Phase, PhaseError, PhaseName, PhaseState, RoundStart, Shared},
    StateMachine,
};

/// The idle state.
///
/// Publishes the initial node state store and the round parameters before the first round.
#[derive(Debug)]
pub struct Idle;

#[async_trait]
impl Phase for PhaseState<Idle> {
    const NAME: PhaseName = PhaseName::Idle;

    async fn process(&mut self) -> Result<(), PhaseError> {
        info!(
            nodes = self.shared.store.len(),
            rounds = self.shared.state.rounds,
            algorithm = self.shared.strategy.name(),
            "starting run"
        );
        Ok(())
    }

    fn broadcast(&mut self) {
        let events = &mut self.shared.events;

        info!("broadcasting run parameters");
        events.broadcast_params(self.shared.state);

        info!("broadcasting initial node states");
        events.broadcast_store(self.shared.store.clone());

        events.broadcast_eligible(EligibleUpdate::Invalidate);
        events.broadcast_report(ReportUpdate::Invalidate);
    }

    fn next(self) -> StateMachine {
        PhaseState::<RoundStart>::new(self.shared).into()
    }
}

impl PhaseState<Idle> {
    /// Creates a new idle state.
    pub fn new(shared: Shared) -> Self {
        Self {
            private: Idle,
            shared,
        }
    }
}
