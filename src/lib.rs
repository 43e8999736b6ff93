//! A fully-connected sigmoid network trained with mini-batch stochastic gradient descent and
//! backpropagation, sized by default for classifying 28x28 handwritten digits.

pub mod activation;
pub mod cost;
pub mod error;
pub mod mnist;
pub mod model;
pub mod network;
pub mod sample;

pub use cost::{Cost, QuadraticCost};
pub use error::{Error, Result};
pub use model::{ExportedModel, WeightMatrix};
pub use network::{EpochReport, Gradients, Hyperparameters, Network, argmax, shuffle};
pub use sample::{TestSample, TrainingSample};
