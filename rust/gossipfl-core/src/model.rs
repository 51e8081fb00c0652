//! Model state representation and averaging.
//!
//! A [`ModelState`] is a snapshot of the parameters of a model: a mapping from parameter names
//! to [`Tensor`]s. Floating point tensors are averaged element-wise, integer tensors (running
//! counters and the like) are never averaged and are carried over from a representative state.

use std::{
    collections::{btree_map, BTreeMap},
    iter::{FromIterator, IntoIterator},
};

use derive_more::{Display, From, Into};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The element type of a [`Tensor`].
#[derive(Debug, Clone, Copy, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TensorKind {
    #[display(fmt = "float")]
    Float,
    #[display(fmt = "integer")]
    Int,
}

/// A multi-dimensional array of parameters.
#[derive(Debug, Clone, PartialEq, From, Serialize, Deserialize)]
pub enum Tensor {
    /// Trainable floating point parameters.
    Float(ArrayD<f64>),
    /// Integer parameters, e.g. the number of batches seen by a normalization layer.
    Int(ArrayD<i64>),
}

impl Tensor {
    /// Gets the element type of this tensor.
    pub fn kind(&self) -> TensorKind {
        match self {
            Tensor::Float(_) => TensorKind::Float,
            Tensor::Int(_) => TensorKind::Int,
        }
    }

    /// Gets the shape of this tensor.
    pub fn shape(&self) -> &[usize] {
        match self {
            Tensor::Float(array) => array.shape(),
            Tensor::Int(array) => array.shape(),
        }
    }

    pub fn as_float(&self) -> Option<&ArrayD<f64>> {
        match self {
            Tensor::Float(array) => Some(array),
            Tensor::Int(_) => None,
        }
    }

    pub fn as_float_mut(&mut self) -> Option<&mut ArrayD<f64>> {
        match self {
            Tensor::Float(array) => Some(array),
            Tensor::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<&ArrayD<i64>> {
        match self {
            Tensor::Int(array) => Some(array),
            Tensor::Float(_) => None,
        }
    }

    pub fn as_int_mut(&mut self) -> Option<&mut ArrayD<i64>> {
        match self {
            Tensor::Int(array) => Some(array),
            Tensor::Float(_) => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
/// Errors related to model states which can't be combined.
pub enum ShapeMismatchError {
    #[error("cannot average an empty set of model states")]
    Empty,
    #[error("parameter `{0}` is missing from at least one of the model states")]
    MissingParameter(String),
    #[error("parameter `{name}` is of kind {expected} in one model state and {found} in another")]
    Kind {
        name: String,
        expected: TensorKind,
        found: TensorKind,
    },
    #[error("parameter `{name}` has shape {expected:?} in one model state and {found:?} in another")]
    Shape {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, From, Into, Serialize, Deserialize)]
/// A snapshot of the parameters of a model, keyed by parameter name.
pub struct ModelState(BTreeMap<String, Tensor>);

impl ModelState {
    /// Creates an empty model state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the number of parameters of this model state.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Inserts a parameter, returning the tensor previously stored under the same name.
    pub fn insert(&mut self, name: impl Into<String>, tensor: impl Into<Tensor>) -> Option<Tensor> {
        self.0.insert(name.into(), tensor.into())
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.0.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Tensor> {
        self.0.get_mut(name)
    }

    /// Creates an iterator over the parameter names in ascending order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Creates an iterator over the parameters in ascending name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Tensor> {
        self.0.iter()
    }

    /// Checks that `other` has exactly the same parameter names, tensor kinds and shapes.
    ///
    /// # Errors
    /// Fails with the first difference found.
    pub fn check_compatible(&self, other: &ModelState) -> Result<(), ShapeMismatchError> {
        for (name, ours) in self.iter() {
            let theirs = other
                .get(name)
                .ok_or_else(|| ShapeMismatchError::MissingParameter(name.clone()))?;
            if ours.kind() != theirs.kind() {
                return Err(ShapeMismatchError::Kind {
                    name: name.clone(),
                    expected: ours.kind(),
                    found: theirs.kind(),
                });
            }
            if ours.shape() != theirs.shape() {
                return Err(ShapeMismatchError::Shape {
                    name: name.clone(),
                    expected: ours.shape().to_vec(),
                    found: theirs.shape().to_vec(),
                });
            }
        }
        if let Some(name) = other.names().find(|name| !self.0.contains_key(*name)) {
            return Err(ShapeMismatchError::MissingParameter(name.to_string()));
        }
        Ok(())
    }

    /// Computes the element-wise mean of the given model states.
    ///
    /// Floating point parameters are averaged, integer parameters are copied from the first
    /// state, which acts as the representative of the set.
    ///
    /// # Errors
    /// Fails if `states` is empty or if any state is incompatible with the first one.
    pub fn average(states: &[&ModelState]) -> Result<ModelState, ShapeMismatchError> {
        let weighted = states
            .iter()
            .map(|state| (*state, 1.0))
            .collect::<Vec<_>>();
        Self::weighted_average(&weighted)
    }

    /// Computes the weighted element-wise mean of the given model states.
    ///
    /// Weights are expected to be non-negative. If they don't sum up to a positive finite
    /// value, every state is weighted equally. Integer parameters are copied from the first
    /// state.
    ///
    /// # Errors
    /// Fails if `states` is empty or if any state is incompatible with the first one.
    pub fn weighted_average(states: &[(&ModelState, f64)]) -> Result<ModelState, ShapeMismatchError> {
        let (representative, _) = states.first().ok_or(ShapeMismatchError::Empty)?;
        for (state, _) in &states[1..] {
            representative.check_compatible(state)?;
        }

        let total_weight: f64 = states.iter().map(|(_, weight)| weight).sum();
        let uniform = !(total_weight.is_finite() && total_weight > 0.0);
        let total_weight = if uniform {
            states.len() as f64
        } else {
            total_weight
        };

        let averaged = representative
            .iter()
            .map(|(name, tensor)| {
                let tensor = match tensor {
                    Tensor::Int(_) => tensor.clone(),
                    Tensor::Float(first) => {
                        let mut sum = ArrayD::<f64>::zeros(first.raw_dim());
                        for (state, weight) in states {
                            let weight = if uniform { 1.0 } else { *weight };
                            // the compatibility check guarantees a float tensor of equal shape
                            if let Some(Tensor::Float(values)) = state.get(name) {
                                sum.scaled_add(weight, values);
                            }
                        }
                        sum /= total_weight;
                        Tensor::Float(sum)
                    }
                };
                (name.clone(), tensor)
            })
            .collect();
        Ok(averaged)
    }
}

impl FromIterator<(String, Tensor)> for ModelState {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        ModelState(iter.into_iter().collect())
    }
}

impl IntoIterator for ModelState {
    type Item = (String, Tensor);
    type IntoIter = btree_map::IntoIter<String, Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ModelState {
    type Item = (&'a String, &'a Tensor);
    type IntoIter = btree_map::Iter<'a, String, Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
