//! Helpers to build model states in tests.

use ndarray::{arr0, ArrayD, IxDyn};

use crate::model::{ModelState, Tensor};

/// The name of the integer counter parameter of [`toy_state`].
pub const COUNTER: &str = "norm.num_batches_tracked";

/// Creates a small model state whose float parameters are all equal to `value` and whose
/// counter is zero.
pub fn toy_state(value: f64) -> ModelState {
    let mut state = ModelState::new();
    state.insert("linear.weight", ArrayD::from_elem(IxDyn(&[2, 3]), value));
    state.insert("linear.bias", ArrayD::from_elem(IxDyn(&[3]), value));
    state.insert(COUNTER, arr0(0_i64).into_dyn());
    state
}

/// Adds `delta` to every float parameter of `state`.
pub fn shifted(state: &ModelState, delta: f64) -> ModelState {
    state
        .iter()
        .map(|(name, tensor)| {
            let tensor = match tensor {
                Tensor::Float(values) => Tensor::Float(values.mapv(|value| value + delta)),
                Tensor::Int(_) => tensor.clone(),
            };
            (name.clone(), tensor)
        })
        .collect()
}

/// Sets the integer counter of a [`toy_state`].
pub fn with_counter(mut state: ModelState, counter: i64) -> ModelState {
    state.insert(COUNTER, arr0(counter).into_dyn());
    state
}

/// Gets the integer counter of a [`toy_state`].
pub fn counter(state: &ModelState) -> i64 {
    state
        .get(COUNTER)
        .and_then(Tensor::as_int)
        .map(|counter| counter.sum())
        .expect("missing counter")
}

/// Asserts that two model states have the same layout, equal integer parameters and float
/// parameters which differ by at most `1e-9`.
pub fn assert_states_close(actual: &ModelState, expected: &ModelState) {
    actual
        .check_compatible(expected)
        .expect("incompatible model states");
    for (name, tensor) in actual {
        match (tensor, expected.get(name).unwrap()) {
            (Tensor::Float(a), Tensor::Float(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    assert!(
                        (x - y).abs() <= 1e-9,
                        "parameter `{}` differs: {} != {}",
                        name,
                        x,
                        y
                    );
                }
            }
            (a, b) => assert_eq!(a, b, "parameter `{}` differs", name),
        }
    }
}
