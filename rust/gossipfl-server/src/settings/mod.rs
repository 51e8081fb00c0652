//! Loading and validation of settings.
//!
//! Values defined in the configuration file can be overridden by environment variables. An
//! example configuration file can be found in the `configs/` directory located in the repository
//! root.

#[cfg(test)]
mod tests;

use std::{fmt, path::Path, path::PathBuf};

use config::{Config, ConfigError, Environment};
use serde::{
    de::{self, Deserializer, Visitor},
    Deserialize,
};
use thiserror::Error;
use tracing_subscriber::filter::EnvFilter;
use validator::{Validate, ValidationError, ValidationErrors};

use gossipfl_core::{NodeId, Topology, TopologyError};

#[derive(Error, Debug)]
/// An error related to loading and validation of settings.
pub enum SettingsError {
    #[error("configuration loading failed: {0}")]
    Loading(#[from] ConfigError),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

#[derive(Debug, Validate, Deserialize)]
/// The combined settings.
///
/// Each section in the configuration file corresponds to the identically named settings field.
pub struct Settings {
    #[validate]
    pub training: TrainingSettings,
    #[validate]
    pub algorithm: AlgorithmSettings,
    #[validate]
    pub topology: TopologySettings,
    #[validate]
    pub simulation: SimulationSettings,
    #[serde(default)]
    pub evaluation: EvaluationSettings,
    #[serde(default)]
    pub report: ReportSettings,
    pub log: LoggingSettings,
}

impl Settings {
    /// Loads and validates the settings via a configuration file.
    ///
    /// # Errors
    /// Fails when the loading of the configuration file or its validation failed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let settings: Settings = Self::load(path)?;
        settings.validate()?;
        Ok(settings)
    }

    fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Config::new();
        config.merge(config::File::from(path.as_ref()))?;
        config.merge(Environment::with_prefix("gossipfl").separator("__"))?;
        config.try_into()
    }
}

#[derive(Debug, Validate, Deserialize, Clone, Copy, PartialEq)]
#[validate(schema(function = "validate_training"))]
/// The round loop settings.
pub struct TrainingSettings {
    /// The number of communication rounds. The value must be at least `1`.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [training]
    /// rounds = 10
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// GOSSIPFL_TRAINING__ROUNDS=10
    /// ```
    pub rounds: u64,
    /// The fraction of nodes which are eligible in a round. The value must be between `0` and
    /// `1` (i.e. `0 < participation <= 1`). At least one node is selected in every round.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [training]
    /// participation = 0.5
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// GOSSIPFL_TRAINING__PARTICIPATION=0.5
    /// ```
    pub participation: f64,
    /// The number of local epochs. For the `p2p` algorithm this is the upper bound of the
    /// uniformly drawn number of local epochs of a node.
    pub local_epochs: u32,
    /// The seed of all random sources of a run.
    pub seed: u64,
}

impl TrainingSettings {
    /// Checks the training settings.
    fn validate_training(&self) -> Result<(), ValidationError> {
        if self.rounds < 1 {
            return Err(ValidationError::new("at least one round is required"));
        }
        if !(0. < self.participation && self.participation <= 1.) {
            return Err(ValidationError::new("participation must be in (0, 1]"));
        }
        if self.local_epochs < 1 {
            return Err(ValidationError::new("at least one local epoch is required"));
        }
        Ok(())
    }
}

/// A wrapper for validate derive.
fn validate_training(s: &TrainingSettings) -> Result<(), ValidationError> {
    s.validate_training()
}

/// The available federated learning algorithms.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmName {
    /// Centralized federated averaging.
    FedAvg,
    /// Centralized federated averaging with a proximal term in local training.
    FedProx,
    /// Decentralized gossip averaging over the configured topology.
    P2p,
}

#[derive(Debug, Validate, Deserialize, Clone, Copy, PartialEq)]
#[validate(schema(function = "validate_algorithm"))]
/// The algorithm settings.
pub struct AlgorithmSettings {
    /// The algorithm, one of `fedavg`, `fedprox` or `p2p`.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [algorithm]
    /// name = "p2p"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// GOSSIPFL_ALGORITHM__NAME=fedprox
    /// ```
    pub name: AlgorithmName,
    /// The coefficient of the proximal term. Only used by `fedprox`, must not be negative.
    #[serde(default)]
    pub mu: f64,
    /// Whether the centralized average is weighted by the number of local samples.
    #[serde(default)]
    pub weighted: bool,
}

impl AlgorithmSettings {
    /// Checks the algorithm settings.
    fn validate_algorithm(&self) -> Result<(), ValidationError> {
        if self.mu.is_finite() && self.mu >= 0. {
            Ok(())
        } else {
            Err(ValidationError::new("mu must be a non-negative number"))
        }
    }
}

/// A wrapper for validate derive.
fn validate_algorithm(s: &AlgorithmSettings) -> Result<(), ValidationError> {
    s.validate_algorithm()
}

/// The adjacency entry of a single node.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct NodeSettings {
    pub id: NodeId,
    #[serde(default)]
    pub neighbors: Vec<NodeId>,
}

#[derive(Debug, Validate, Deserialize, Clone, PartialEq, Eq)]
#[validate(schema(function = "validate_topology"))]
/// The node settings.
///
/// The listed node ids form the domain of the node state store, for every algorithm. The
/// neighbors are only relevant for the `p2p` algorithm. Neighbors which are not listed as nodes
/// themselves are skipped during aggregation.
///
/// # Examples
///
/// **TOML**
/// ```text
/// [[topology.nodes]]
/// id = 0
/// neighbors = [1, 2]
///
/// [[topology.nodes]]
/// id = 1
/// neighbors = [2]
/// ```
pub struct TopologySettings {
    pub nodes: Vec<NodeSettings>,
}

impl TopologySettings {
    /// Builds the topology.
    ///
    /// # Errors
    /// Fails if a node is listed twice, lists itself or lists a neighbor twice.
    pub fn to_topology(&self) -> Result<Topology, TopologyError> {
        Topology::new(
            self.nodes
                .iter()
                .map(|node| (node.id, node.neighbors.clone())),
        )
    }

    /// Gets the listed node ids.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|node| node.id).collect()
    }

    /// Checks the topology settings.
    fn validate_topology(&self) -> Result<(), ValidationError> {
        if self.nodes.is_empty() {
            return Err(ValidationError::new("at least one node is required"));
        }
        self.to_topology().map(|_| ()).map_err(|err| {
            let mut error = ValidationError::new("invalid adjacency");
            error.message = Some(err.to_string().into());
            error
        })
    }
}

/// A wrapper for validate derive.
fn validate_topology(s: &TopologySettings) -> Result<(), ValidationError> {
    s.validate_topology()
}

#[derive(Debug, Validate, Deserialize, Clone, Copy, PartialEq)]
#[validate(schema(function = "validate_simulation"))]
/// The settings of the synthetic local training.
pub struct SimulationSettings {
    /// The number of weights of the simulated linear model.
    pub dimensions: usize,
    /// The spread of the local optima around the global optimum. `0` means that all nodes share
    /// the same data distribution.
    pub heterogeneity: f64,
    /// The step size of local gradient descent. The value must be between `0` and `1`.
    pub learning_rate: f64,
    /// The minimal number of samples of a node.
    pub min_samples: usize,
    /// The maximal number of samples of a node.
    pub max_samples: usize,
}

impl SimulationSettings {
    /// Checks the simulation settings.
    fn validate_simulation(&self) -> Result<(), ValidationError> {
        if self.dimensions < 1 {
            return Err(ValidationError::new("at least one dimension is required"));
        }
        if !(self.heterogeneity.is_finite() && self.heterogeneity >= 0.) {
            return Err(ValidationError::new("heterogeneity must be non-negative"));
        }
        if !(0. < self.learning_rate && self.learning_rate <= 1.) {
            return Err(ValidationError::new("learning rate must be in (0, 1]"));
        }
        if !(1 <= self.min_samples && self.min_samples <= self.max_samples) {
            return Err(ValidationError::new("invalid sample range"));
        }
        Ok(())
    }
}

/// A wrapper for validate derive.
fn validate_simulation(s: &SimulationSettings) -> Result<(), ValidationError> {
    s.validate_simulation()
}

#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq)]
/// The evaluation settings.
pub struct EvaluationSettings {
    /// Whether the mean of all node states is evaluated at the end of every round. Off by
    /// default.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [evaluation]
    /// global_model = true
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// GOSSIPFL_EVALUATION__GLOBAL_MODEL=true
    /// ```
    #[serde(default)]
    pub global_model: bool,
}

#[derive(Debug, Default, Deserialize, Clone, PartialEq, Eq)]
/// The report settings.
pub struct ReportSettings {
    /// The file the round history is written to as JSON. Nothing is written if it is not set.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
/// The logging settings.
pub struct LoggingSettings {
    /// A comma-separated list of logging directives. More information about logging directives
    /// can be found [here].
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [log]
    /// filter = "info"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// GOSSIPFL_LOG__FILTER=info
    /// ```
    ///
    /// [here]: https://docs.rs/tracing-subscriber/0.2.25/tracing_subscriber/filter/struct.EnvFilter.html#directives
    #[serde(deserialize_with = "deserialize_env_filter")]
    pub filter: EnvFilter,
}

fn deserialize_env_filter<'de, D>(deserializer: D) -> Result<EnvFilter, D::Error>
where
    D: Deserializer<'de>,
{
    struct EnvFilterVisitor;

    impl<'de> Visitor<'de> for EnvFilterVisitor {
        type Value = EnvFilter;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(formatter, "a valid tracing filter directive: https://docs.rs/tracing-subscriber/0.2.25/tracing_subscriber/filter/struct.EnvFilter.html#directives")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            EnvFilter::try_new(value)
                .map_err(|_| de::Error::invalid_value(serde::de::Unexpected::Str(value), &self))
        }
    }

    deserializer.deserialize_str(EnvFilterVisitor)
}
