use crate::state_machine::{
    phases::{
        Aggregating,
        Collecting,
        Dispatching,
        Done,
        Failure,
        Idle,
        PhaseState,
        RoundEnd,
        RoundStart,
        Training,
    },
    StateMachine,
};

impl StateMachine {
    pub fn is_idle(&self) -> bool {
        matches!(self, StateMachine::Idle(_))
    }

    pub fn into_idle_phase_state(self) -> PhaseState<Idle> {
        match self {
            StateMachine::Idle(state) => state,
            _ => panic!("not in idle state"),
        }
    }

    pub fn is_round_start(&self) -> bool {
        matches!(self, StateMachine::RoundStart(_))
    }

    pub fn into_round_start_phase_state(self) -> PhaseState<RoundStart> {
        match self {
            StateMachine::RoundStart(state) => state,
            _ => panic!("not in round start state"),
        }
    }

    pub fn is_dispatching(&self) -> bool {
        matches!(self, StateMachine::Dispatching(_))
    }

    pub fn into_dispatching_phase_state(self) -> PhaseState<Dispatching> {
        match self {
            StateMachine::Dispatching(state) => state,
            _ => panic!("not in dispatching state"),
        }
    }

    pub fn is_training(&self) -> bool {
        matches!(self, StateMachine::Training(_))
    }

    pub fn into_training_phase_state(self) -> PhaseState<Training> {
        match self {
            StateMachine::Training(state) => state,
            _ => panic!("not in training state"),
        }
    }

    pub fn is_collecting(&self) -> bool {
        matches!(self, StateMachine::Collecting(_))
    }

    pub fn into_collecting_phase_state(self) -> PhaseState<Collecting> {
        match self {
            StateMachine::Collecting(state) => state,
            _ => panic!("not in collecting state"),
        }
    }

    pub fn is_aggregating(&self) -> bool {
        matches!(self, StateMachine::Aggregating(_))
    }

    pub fn into_aggregating_phase_state(self) -> PhaseState<Aggregating> {
        match self {
            StateMachine::Aggregating(state) => state,
            _ => panic!("not in aggregating state"),
        }
    }

    pub fn is_round_end(&self) -> bool {
        matches!(self, StateMachine::RoundEnd(_))
    }

    pub fn into_round_end_phase_state(self) -> PhaseState<RoundEnd> {
        match self {
            StateMachine::RoundEnd(state) => state,
            _ => panic!("not in round end state"),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StateMachine::Failure(_))
    }

    pub fn into_failure_phase_state(self) -> PhaseState<Failure> {
        match self {
            StateMachine::Failure(state) => state,
            _ => panic!("not in failure state"),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, StateMachine::Done(_))
    }

    pub fn into_done_phase_state(self) -> PhaseState<Done> {
        match self {
            StateMachine::Done(state) => state,
            _ => panic!("not in done state"),
        }
    }
}
