use crate::activation::sigmoid_prime;
use ndarray::Array2;

/// A cost function paired with the output-layer error term it induces.
///
/// Backpropagation only needs `delta`: the gradient of the cost with respect to the output layer's
/// weighted input z.
pub trait Cost {
    /// Cost of one output activation (or a matrix of them, one sample per column) against its
    /// expected output. Columns are summed.
    fn value(&self, output: &Array2<f64>, expected_output: &Array2<f64>) -> f64;

    /// δ_L for the given output-layer weighted input and activation.
    fn delta(
        &self,
        z: &Array2<f64>,
        output: &Array2<f64>,
        expected_output: &Array2<f64>,
    ) -> Array2<f64>;
}

/// C = ½‖a − y‖², whose derivative with respect to a is exactly (a − y).
#[derive(Debug, Clone, Copy, Default)]
pub struct QuadraticCost;

impl Cost for QuadraticCost {
    fn value(&self, output: &Array2<f64>, expected_output: &Array2<f64>) -> f64 {
        0.5 * (output - expected_output).mapv(|d| d * d).sum()
    }

    fn delta(
        &self,
        z: &Array2<f64>,
        output: &Array2<f64>,
        expected_output: &Array2<f64>,
    ) -> Array2<f64> {
        (output - expected_output) * z.mapv(sigmoid_prime)
    }
}
