use validator::ValidationErrorsKind;

use super::*;

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            rounds: 10,
            participation: 0.5,
            local_epochs: 5,
            seed: 42,
        }
    }
}

impl Default for AlgorithmSettings {
    fn default() -> Self {
        Self {
            name: AlgorithmName::P2p,
            mu: 0.1,
            weighted: true,
        }
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            dimensions: 4,
            heterogeneity: 1.,
            learning_rate: 0.1,
            min_samples: 10,
            max_samples: 100,
        }
    }
}

fn topology(nodes: Vec<(NodeId, Vec<NodeId>)>) -> TopologySettings {
    TopologySettings {
        nodes: nodes
            .into_iter()
            .map(|(id, neighbors)| NodeSettings { id, neighbors })
            .collect(),
    }
}

#[test]
fn test_settings_new() {
    let settings = Settings::new("../../configs/config.toml").unwrap();
    assert_eq!(settings.algorithm.name, AlgorithmName::P2p);
    assert_eq!(settings.topology.node_ids(), (0..7).collect::<Vec<_>>());
    assert_eq!(settings.topology.to_topology().unwrap().neighbors(2), &[1, 3, 5]);
    assert!(!settings.evaluation.global_model);

    assert!(Settings::new("").is_err());
}

#[test]
fn test_validate_training() {
    assert!(TrainingSettings::default().validate().is_ok());

    assert!(TrainingSettings {
        rounds: 0,
        ..TrainingSettings::default()
    }
    .validate()
    .is_err());
    assert!(TrainingSettings {
        participation: 0.,
        ..TrainingSettings::default()
    }
    .validate()
    .is_err());
    assert!(TrainingSettings {
        participation: 1.,
        ..TrainingSettings::default()
    }
    .validate()
    .is_ok());
    assert!(TrainingSettings {
        participation: 1. + f64::EPSILON,
        ..TrainingSettings::default()
    }
    .validate()
    .is_err());
    assert!(TrainingSettings {
        local_epochs: 0,
        ..TrainingSettings::default()
    }
    .validate()
    .is_err());
}

#[test]
fn test_validate_algorithm() {
    assert!(AlgorithmSettings::default().validate().is_ok());
    assert!(AlgorithmSettings {
        mu: -0.1,
        ..AlgorithmSettings::default()
    }
    .validate()
    .is_err());
    assert!(AlgorithmSettings {
        mu: f64::NAN,
        ..AlgorithmSettings::default()
    }
    .validate()
    .is_err());
}

#[test]
fn test_validate_topology() {
    assert!(topology(vec![(0, vec![1]), (1, vec![0])]).validate().is_ok());
    // neighbors outside of the node list are allowed
    assert!(topology(vec![(0, vec![1, 99]), (1, vec![])]).validate().is_ok());

    assert!(topology(vec![]).validate().is_err());
    assert!(topology(vec![(0, vec![0])]).validate().is_err());
    assert!(topology(vec![(0, vec![1]), (0, vec![])]).validate().is_err());
    assert!(topology(vec![(0, vec![1, 1])]).validate().is_err());
}

#[test]
fn test_invalid_adjacency_names_the_node() {
    let errors = topology(vec![(0, vec![1]), (1, vec![2, 1])])
        .validate()
        .unwrap_err();
    match errors.errors().get("__all__") {
        Some(ValidationErrorsKind::Field(errors)) => {
            assert_eq!(errors[0].code, "invalid adjacency");
            assert_eq!(
                errors[0].message.as_deref(),
                Some("node 1 lists itself as a neighbor")
            );
        }
        other => panic!("unexpected validation errors: {:?}", other),
    }
}

#[test]
fn test_validate_simulation() {
    assert!(SimulationSettings::default().validate().is_ok());
    assert!(SimulationSettings {
        dimensions: 0,
        ..SimulationSettings::default()
    }
    .validate()
    .is_err());
    assert!(SimulationSettings {
        learning_rate: 0.,
        ..SimulationSettings::default()
    }
    .validate()
    .is_err());
    assert!(SimulationSettings {
        min_samples: 200,
        ..SimulationSettings::default()
    }
    .validate()
    .is_err());
    assert!(SimulationSettings {
        heterogeneity: -1.,
        ..SimulationSettings::default()
    }
    .validate()
    .is_err());
}

#[test]
fn test_deserialize_algorithm_name() {
    #[derive(Deserialize)]
    struct Wrapper {
        name: AlgorithmName,
    }

    let mut config = Config::new();
    config.set("name", "fedprox").unwrap();
    let wrapper: Wrapper = config.try_into().unwrap();
    assert_eq!(wrapper.name, AlgorithmName::FedProx);

    let mut config = Config::new();
    config.set("name", "gossip").unwrap();
    assert!(config.try_into::<Wrapper>().is_err());
}
