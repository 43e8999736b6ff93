use crate::error::{Error, Result};
use ndarray::{Array, Array2};

// A single input paired with the output the network should produce for it. expected_output is a
// [classes x 1] one-hot column: the neuron for the correct class is 1.0 and every other neuron is
// 0.0, which is exactly the activation a perfect network would produce.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSample {
    pub input: Array2<f64>,
    pub expected_output: Array2<f64>,
}

// A single input paired with the index of its correct class.
#[derive(Debug, Clone, PartialEq)]
pub struct TestSample {
    pub input: Array2<f64>,
    pub expected_answer: usize,
}

impl TrainingSample {
    pub fn new(input: Array2<f64>, expected_output: Array2<f64>) -> TrainingSample {
        TrainingSample {
            input,
            expected_output,
        }
    }
}

impl TestSample {
    pub fn new(input: Array2<f64>, expected_answer: usize) -> TestSample {
        TestSample {
            input,
            expected_answer,
        }
    }

    /// Converts into a training sample whose expected output is the one-hot encoding of the label.
    pub fn into_training(self, classes: usize) -> Result<TrainingSample> {
        Ok(TrainingSample {
            expected_output: one_hot(self.expected_answer, classes)?,
            input: self.input,
        })
    }
}

/// A [classes x 1] column with 1.0 at `class` and 0.0 everywhere else.
pub fn one_hot(class: usize, classes: usize) -> Result<Array2<f64>> {
    if class >= classes {
        return Err(Error::MalformedData(format!(
            "label {class} is outside the {classes} available classes"
        )));
    }
    Ok(Array::from_shape_fn((classes, 1), |(i, _j)| {
        if i == class { 1.0 } else { 0.0 }
    }))
}

/// Builds a [len x 1] column vector from plain values.
pub fn column(values: &[f64]) -> Array2<f64> {
    Array::from_shape_fn((values.len(), 1), |(i, _j)| values[i])
}
