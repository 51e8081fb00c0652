//! This module provides the states (aka phases) of the [`StateMachine`].
//!
//! [`StateMachine`]: crate::state_machine::StateMachine

mod aggregating;
mod collecting;
mod dispatching;
mod done;
mod failure;
mod idle;
mod phase;
mod round_end;
mod round_start;
mod training;

pub use self::{
    aggregating::Aggregating,
    collecting::Collecting,
    dispatching::Dispatching,
    done::Done,
    failure::{Failure, PhaseError},
    idle::Idle,
    phase::{Phase, PhaseName, PhaseState, Shared},
    round_end::RoundEnd,
    round_start::RoundStart,
    training::Training,
};
