use std::sync::Arc;

use gossipfl_core::{
    testutils::{counter, toy_state, with_counter},
    ModelState,
    Topology,
};

use super::utils::{line_topology, AdditiveTrainer};
use crate::{
    settings::{AlgorithmName, AlgorithmSettings, TrainingSettings},
    state_machine::{
        events::{EligibleUpdate, ReportUpdate},
        phases::PhaseName,
        StateMachineInitializationError,
        StateMachineInitializer,
    },
    training::LocalTrainer,
};

fn trainer() -> Arc<dyn LocalTrainer> {
    Arc::new(AdditiveTrainer::uniform(1.))
}

#[test]
fn test_initializer_idle() {
    let initial_state = with_counter(toy_state(0.), 7);
    let smi = StateMachineInitializer::new(
        TrainingSettings::default(),
        AlgorithmSettings::default(),
        line_topology(),
        initial_state.clone(),
        trainer(),
    );

    let (state_machine, event_subscriber) = smi.init().unwrap();
    assert!(state_machine.is_idle());

    let phase = event_subscriber.phase_listener().get_latest().event;
    assert_eq!(phase, PhaseName::Idle);

    let round_id = event_subscriber.params_listener().get_latest().round_id;
    assert_eq!(round_id, 0);

    let params = event_subscriber.params_listener().get_latest().event;
    assert_eq!(params.rounds, 10);
    assert_eq!(params.local_epochs, 5);

    let eligible = event_subscriber.eligible_listener().get_latest().event;
    assert_eq!(eligible, EligibleUpdate::Invalidate);

    let report = event_subscriber.report_listener().get_latest().event;
    assert_eq!(report, ReportUpdate::Invalidate);

    // every node of the topology starts with its own copy of the initial state
    let store = event_subscriber.store_listener().get_latest().event;
    assert_eq!(store.nodes().collect::<Vec<_>>(), vec![0, 1, 2]);
    for (_, state) in store.iter() {
        assert_eq!(state, &initial_state);
        assert_eq!(counter(state), 7);
    }
}

#[test]
fn test_initializer_star_algorithms() {
    for (name, expected) in [
        (AlgorithmName::FedAvg, "fedavg"),
        (AlgorithmName::FedProx, "fedprox"),
    ] {
        let smi = StateMachineInitializer::new(
            TrainingSettings::default(),
            AlgorithmSettings {
                name,
                ..AlgorithmSettings::default()
            },
            line_topology(),
            toy_state(0.),
            trainer(),
        );
        let state_machine = smi.init().unwrap().0.into_idle_phase_state();
        assert_eq!(state_machine.shared.history.algorithm, expected);
    }
}

#[test]
fn test_initializer_unknown_neighbors() {
    // neighbor 99 has no adjacency entry and therefore no state
    let topology = Topology::new(vec![(0, vec![1, 99]), (1, vec![0])]).unwrap();
    let smi = StateMachineInitializer::new(
        TrainingSettings::default(),
        AlgorithmSettings::default(),
        topology,
        toy_state(0.),
        trainer(),
    );

    let (_, event_subscriber) = smi.init().unwrap();
    let store = event_subscriber.store_listener().get_latest().event;
    assert_eq!(store.nodes().collect::<Vec<_>>(), vec![0, 1]);
}

#[test]
fn test_initializer_no_nodes() {
    let smi = StateMachineInitializer::new(
        TrainingSettings::default(),
        AlgorithmSettings::default(),
        Topology::empty(),
        toy_state(0.),
        trainer(),
    );
    assert_eq!(
        smi.init().err(),
        Some(StateMachineInitializationError::NoNodes)
    );
}

#[test]
fn test_initializer_empty_state() {
    let smi = StateMachineInitializer::new(
        TrainingSettings::default(),
        AlgorithmSettings::default(),
        line_topology(),
        ModelState::new(),
        trainer(),
    );
    assert_eq!(
        smi.init().err(),
        Some(StateMachineInitializationError::EmptyInitialState)
    );
}
