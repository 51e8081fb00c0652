//! Coordinator state and round parameter types.

use serde::{Deserialize, Serialize};

use gossipfl_core::RoundId;

use crate::settings::TrainingSettings;

/// The coordinator state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorState {
    /// Internal ID used to identify a round. `0` before the first round starts.
    pub round_id: RoundId,
    /// The number of rounds of the run.
    pub rounds: u64,
    /// The fraction of eligible nodes per round.
    pub participation: f64,
    /// The configured number of local epochs.
    pub local_epochs: u32,
}

impl CoordinatorState {
    pub fn new(training: &TrainingSettings) -> Self {
        Self {
            round_id: 0,
            rounds: training.rounds,
            participation: training.participation,
            local_epochs: training.local_epochs,
        }
    }

    /// Checks whether the current round is the last one.
    pub fn is_last_round(&self) -> bool {
        self.round_id >= self.rounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_last_round() {
        let training = TrainingSettings {
            rounds: 2,
            participation: 1.,
            local_epochs: 1,
            seed: 0,
        };
        let mut state = CoordinatorState::new(&training);
        assert_eq!(state.round_id, 0);
        assert!(!state.is_last_round());
        state.round_id = 2;
        assert!(state.is_last_round());
    }
}
