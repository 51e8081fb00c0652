use std::sync::Arc;

use crate::{
    state_machine::{
        phases::{PhaseError, PhaseName, PhaseState, Shared},
        RunError,
        RunSummary,
    },
    store::NodeStateStore,
};

/// The final state.
///
/// Holds the error of a failed run. Unlike all other states it has no successor, the run ends
/// with `finish`.
#[derive(Debug)]
pub struct Done {
    error: Option<PhaseError>,
}

impl Done {
    pub fn error(&self) -> Option<&PhaseError> {
        self.error.as_ref()
    }
}

impl PhaseState<Done> {
    /// Creates a new final state.
    pub fn new(shared: Shared, error: Option<PhaseError>) -> Self {
        Self {
            private: Done { error },
            shared,
        }
    }

    /// Ends the run.
    ///
    /// # Errors
    /// Fails with the error which moved the run into the failure state, if any. The error carries
    /// the store of the last completed round.
    pub fn finish(mut self) -> Result<RunSummary, RunError> {
        let _span = error_span!("run_phase", phase = %PhaseName::Done).entered();
        self.shared.events.broadcast_phase(PhaseName::Done);

        let Shared {
            state,
            store,
            history,
            ..
        } = self.shared;
        let store = Arc::try_unwrap(store).unwrap_or_else(|store| NodeStateStore::clone(&store));

        match self.private.error {
            None => {
                info!(rounds = history.rounds.len(), "run completed");
                Ok(RunSummary { store, history })
            }
            Some(error) => {
                warn!(round_id = state.round_id, "run failed");
                Err(RunError {
                    round_id: state.round_id,
                    error,
                    store,
                    history,
                })
            }
        }
    }
}
