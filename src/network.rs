use crate::activation::{sigmoid, sigmoid_prime};
use crate::cost::{Cost, QuadraticCost};
use crate::error::{Error, Result, ensure_shape};
use crate::model::ExportedModel;
use crate::sample::{TestSample, TrainingSample};
use ndarray::{Array, Array2, Axis, concatenate};
use ndarray_rand::{
    RandomExt,
    rand::{Rng, seq::SliceRandom, thread_rng},
    rand_distr::StandardNormal,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A fully-connected feedforward network of sigmoid neurons.
///
/// `weights[i]` has shape `[sizes[i + 1] x sizes[i]]`: row j holds the weights of the connections
/// from every neuron of layer i into neuron j of layer i + 1. `biases[i]` is the matching
/// `[sizes[i + 1] x 1]` column. The input layer has no biases.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    num_layers: usize,
    sizes: Vec<usize>,
    biases: Vec<Array2<f64>>,
    weights: Vec<Array2<f64>>,
}

/// Per-parameter gradients of the cost, shaped exactly like a network's biases and weights.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    pub biases: Vec<Array2<f64>>,
    pub weights: Vec<Array2<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub epochs: usize,
    pub mini_batch_size: usize,
    pub learning_rate: f64,
    /// Compute the mean training cost at the end of every epoch. Costs one extra forward pass over
    /// the training data per epoch.
    #[serde(default)]
    pub monitor_training_cost: bool,
}

/// Outcome of one training epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Correctly classified test samples, if test data was supplied.
    pub correct: Option<usize>,
    /// Size of the test data, if supplied.
    pub total: Option<usize>,
    /// Mean quadratic cost over the training data, if monitored.
    pub training_cost: Option<f64>,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Hyperparameters {
            epochs: 30,
            mini_batch_size: 10,
            learning_rate: 3.0,
            monitor_training_cost: false,
        }
    }
}

impl Hyperparameters {
    pub fn new(epochs: usize, mini_batch_size: usize, learning_rate: f64) -> Hyperparameters {
        Hyperparameters {
            epochs,
            mini_batch_size,
            learning_rate,
            monitor_training_cost: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::InvalidHyperparameter(
                "epochs must be at least 1".to_string(),
            ));
        }
        if self.mini_batch_size == 0 {
            return Err(Error::InvalidHyperparameter(
                "mini_batch_size must be at least 1".to_string(),
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::InvalidHyperparameter(format!(
                "learning_rate must be a finite positive number, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

impl Network {
    /// Creates a network whose biases and weights are drawn from a standard normal distribution
    /// (mean 0, standard deviation 1) using the thread-local generator.
    pub fn new(sizes: Vec<usize>) -> Result<Network> {
        Network::new_using(sizes, &mut thread_rng())
    }

    /// Like [`Network::new`], but draws the initial parameters from `rng`.
    pub fn new_using<R: Rng + ?Sized>(sizes: Vec<usize>, rng: &mut R) -> Result<Network> {
        validate_topology(&sizes)?;

        let biases: Vec<Array2<f64>> = sizes
            // For each size in sizes except the first one, make a [size x 1] column.
            .iter()
            .skip(1)
            .map(|&size| Array::random_using((size, 1), StandardNormal, rng))
            .collect();
        let weights: Vec<Array2<f64>> = sizes
            // Pair each size with the following one and make a [next_size x current_size] matrix.
            .iter()
            .zip(sizes.iter().skip(1))
            .map(|(&current_size, &next_size)| {
                Array::random_using((next_size, current_size), StandardNormal, rng)
            })
            .collect();

        debug!(?sizes, "initialized network");

        Ok(Network {
            num_layers: sizes.len(),
            sizes,
            biases,
            weights,
        })
    }

    /// Rebuilds a network from existing parameters, checking that they chain into a valid
    /// topology.
    pub fn from_parameters(
        biases: Vec<Array2<f64>>,
        weights: Vec<Array2<f64>>,
    ) -> Result<Network> {
        if weights.is_empty() {
            return Err(Error::MalformedModel(
                "a network needs at least one weight matrix".to_string(),
            ));
        }
        if biases.len() != weights.len() {
            return Err(Error::MalformedModel(format!(
                "{} bias vectors for {} weight matrices",
                biases.len(),
                weights.len()
            )));
        }

        let mut sizes = Vec::with_capacity(weights.len() + 1);
        sizes.push(weights[0].ncols());
        for (i, (bias, weight)) in biases.iter().zip(weights.iter()).enumerate() {
            // Each transition must start where the previous one ended.
            ensure_shape(
                format!("weights[{i}]"),
                (weight.nrows(), sizes[i]),
                weight.dim(),
            )?;
            ensure_shape(format!("biases[{i}]"), (weight.nrows(), 1), bias.dim())?;
            sizes.push(weight.nrows());
        }
        validate_topology(&sizes)?;

        Ok(Network {
            num_layers: sizes.len(),
            sizes,
            biases,
            weights,
        })
    }

    pub fn num_layers(&self) -> usize {
        self.num_layers
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn biases(&self) -> &[Array2<f64>] {
        &self.biases
    }

    pub fn weights(&self) -> &[Array2<f64>] {
        &self.weights
    }

    // Calculates the activations of the output layer, given the activations of the input layer. The
    // input activation must be a [self.sizes[0] x 1] column.
    pub fn feedforward(&self, input_activation: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_input(input_activation)?;

        // Compute a' = σ(w.a + b) for every layer in turn, overwriting the activation each time as
        // only the prior activation is needed. The last state gives the output layer.
        let mut activation = input_activation.to_owned();
        for (bias, weight) in self.biases.iter().zip(self.weights.iter()) {
            activation = weight.dot(&activation) + bias;
            activation.mapv_inplace(sigmoid);
        }

        Ok(activation)
    }

    /// Gradient of the quadratic cost for a single sample, as `(∇biases, ∇weights)`.
    pub fn backprop(
        &self,
        input: &Array2<f64>,
        expected_output: &Array2<f64>,
    ) -> Result<Gradients> {
        self.backprop_with(&QuadraticCost, input, expected_output)
    }

    /// Gradient of an arbitrary cost for a single sample.
    pub fn backprop_with(
        &self,
        cost: &dyn Cost,
        input: &Array2<f64>,
        expected_output: &Array2<f64>,
    ) -> Result<Gradients> {
        self.check_input(input)?;
        self.check_expected_output(expected_output)?;
        Ok(self.backpropagate(cost, input, expected_output))
    }

    // Adjust the network's biases and weights by one step of gradient descent, averaged over the
    // given batch of training data. The divisor is the actual length of the batch, which may be
    // shorter than mini_batch_size for the last batch of an epoch.
    pub fn update_mini_batch(
        &mut self,
        mini_batch: &[TrainingSample],
        learning_rate: f64,
    ) -> Result<()> {
        if mini_batch.is_empty() {
            return Err(Error::EmptyBatch);
        }
        for sample in mini_batch {
            self.check_input(&sample.input)?;
            self.check_expected_output(&sample.expected_output)?;
        }

        // Combine each sample's input and expected output into a single matrix where each column
        // corresponds to a separate sample. Backpropagating the whole matrix at once sums the
        // per-sample gradients.
        let inputs = concatenate(
            Axis(1),
            &mini_batch
                .iter()
                .map(|sample| sample.input.view())
                .collect::<Vec<_>>(),
        )?;
        let expected_outputs = concatenate(
            Axis(1),
            &mini_batch
                .iter()
                .map(|sample| sample.expected_output.view())
                .collect::<Vec<_>>(),
        )?;

        let mut nabla = self.backpropagate(&QuadraticCost, &inputs, &expected_outputs);
        let scale = learning_rate / mini_batch.len() as f64;

        for (bias, nabla_bias) in self.biases.iter_mut().zip(nabla.biases.iter_mut()) {
            // The gradient is dropped after this, so scale it in place rather than allocating.
            nabla_bias.mapv_inplace(|nb| nb * scale);
            *bias -= &*nabla_bias;
        }
        for (weight, nabla_weight) in self.weights.iter_mut().zip(nabla.weights.iter_mut()) {
            nabla_weight.mapv_inplace(|nw| nw * scale);
            *weight -= &*nabla_weight;
        }

        Ok(())
    }

    // Trains the network with mini-batch stochastic gradient descent. Every epoch the training data
    // is shuffled, cut into contiguous batches of mini_batch_size (the last may be shorter), and
    // each batch is applied in order. If test data is given, the network is evaluated against it
    // after every epoch.
    pub fn stochastic_gradient_descent<R: Rng + ?Sized>(
        &mut self,
        training_data: &mut [TrainingSample],
        hyperparameters: &Hyperparameters,
        test_data: Option<&[TestSample]>,
        rng: &mut R,
    ) -> Result<Vec<EpochReport>> {
        hyperparameters.validate()?;
        if training_data.is_empty() {
            return Err(Error::EmptyBatch);
        }

        let mut reports = Vec::with_capacity(hyperparameters.epochs);

        for epoch in 1..=hyperparameters.epochs {
            shuffle(training_data, rng);

            for mini_batch in training_data.chunks(hyperparameters.mini_batch_size) {
                self.update_mini_batch(mini_batch, hyperparameters.learning_rate)?;
            }

            let training_cost = if hyperparameters.monitor_training_cost {
                Some(self.total_cost(training_data)?)
            } else {
                None
            };

            let report = match test_data {
                Some(test_data) => {
                    let correct = self.evaluate(test_data)?;
                    info!("Epoch {epoch}: {correct} / {}", test_data.len());
                    EpochReport {
                        epoch,
                        correct: Some(correct),
                        total: Some(test_data.len()),
                        training_cost,
                    }
                }
                None => {
                    info!("Epoch {epoch} complete");
                    EpochReport {
                        epoch,
                        correct: None,
                        total: None,
                        training_cost,
                    }
                }
            };
            if let Some(cost) = training_cost {
                info!(epoch, cost, "training cost");
            }

            reports.push(report);
        }

        Ok(reports)
    }

    // Run the network on every test sample and count how many are classified correctly.
    pub fn evaluate(&self, test_data: &[TestSample]) -> Result<usize> {
        let mut correct = 0;
        for sample in test_data {
            let output = self.feedforward(&sample.input)?;
            if argmax(&output) == Some(sample.expected_answer) {
                correct += 1;
            }
        }
        Ok(correct)
    }

    /// Mean quadratic cost over a set of training samples.
    pub fn total_cost(&self, data: &[TrainingSample]) -> Result<f64> {
        if data.is_empty() {
            return Ok(0.0);
        }
        let mut total = 0.0;
        for sample in data {
            self.check_expected_output(&sample.expected_output)?;
            let output = self.feedforward(&sample.input)?;
            total += QuadraticCost.value(&output, &sample.expected_output);
        }
        Ok(total / data.len() as f64)
    }

    /// Deep copy of the current parameters for persistence.
    pub fn export_model(&self) -> ExportedModel {
        ExportedModel::from_parameters(&self.biases, &self.weights)
    }

    // Calculate the gradients of all biases and weights. Every column of inputs is a separate sample
    // with the matching column of expected_outputs as its target; the returned gradients are the sum
    // over all columns. Shapes must already have been checked.
    fn backpropagate(
        &self,
        cost: &dyn Cost,
        inputs: &Array2<f64>,
        expected_outputs: &Array2<f64>,
    ) -> Gradients {
        let last = self.num_layers - 2;

        let mut nabla_biases: Vec<Array2<f64>> = self
            .biases
            .iter()
            .map(|bias| Array::zeros(bias.raw_dim()))
            .collect();
        let mut nabla_weights: Vec<Array2<f64>> = self
            .weights
            .iter()
            .map(|weight| Array::zeros(weight.raw_dim()))
            .collect();

        // activations[i] is the input to weights[i]; zs[i] is the weighted input of layer i + 1.
        // The input is pushed inside the loop and the output activation is kept aside, since
        // pushing moves the array.
        let mut activation = inputs.clone();
        let mut activations = Vec::with_capacity(self.num_layers);
        let mut zs = Vec::with_capacity(self.num_layers - 1);

        for (bias, weight) in self.biases.iter().zip(self.weights.iter()) {
            let z = weight.dot(&activation) + bias;
            activations.push(activation);
            activation = z.mapv(sigmoid);
            zs.push(z);
        }

        // Summing delta along its rows adds up the per-sample bias gradients. The dot product with
        // the activation matrix already sums the per-sample weight gradients.
        let mut delta = cost.delta(&zs[last], &activation, expected_outputs);
        nabla_biases[last] = delta.sum_axis(Axis(1)).insert_axis(Axis(1));
        nabla_weights[last] = delta.dot(&activations[last].t());

        for l in (0..last).rev() {
            delta = self.weights[l + 1].t().dot(&delta) * zs[l].mapv(sigmoid_prime);
            nabla_biases[l] = delta.sum_axis(Axis(1)).insert_axis(Axis(1));
            nabla_weights[l] = delta.dot(&activations[l].t());
        }

        Gradients {
            biases: nabla_biases,
            weights: nabla_weights,
        }
    }

    fn check_input(&self, input: &Array2<f64>) -> Result<()> {
        ensure_shape("input", (self.sizes[0], 1), input.dim())
    }

    fn check_expected_output(&self, expected_output: &Array2<f64>) -> Result<()> {
        ensure_shape(
            "expected output",
            (self.sizes[self.num_layers - 1], 1),
            expected_output.dim(),
        )
    }
}

fn validate_topology(sizes: &[usize]) -> Result<()> {
    if sizes.len() < 2 {
        return Err(Error::InvalidTopology(format!(
            "need at least an input and an output layer, got {} layer(s)",
            sizes.len()
        )));
    }
    if let Some(layer) = sizes.iter().position(|&size| size == 0) {
        return Err(Error::InvalidTopology(format!("layer {layer} has no neurons")));
    }
    Ok(())
}

/// Index of the largest activation. Ties go to the lowest index; `None` for an empty array.
pub fn argmax(activations: &Array2<f64>) -> Option<usize> {
    activations
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (index, &value)| match best {
            Some((_, max)) if value > max => Some((index, value)),
            None => Some((index, value)),
            _ => best,
        })
        .map(|(index, _)| index)
}

/// Shuffles in place with a Fisher-Yates pass, so every permutation is equally likely.
pub fn shuffle<T, R: Rng + ?Sized>(data: &mut [T], rng: &mut R) {
    data.shuffle(rng);
}
