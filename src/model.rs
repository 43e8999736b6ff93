//! The persisted form of a trained network.
//!
//! Serialized as JSON:
//!
//! ```json
//! {
//!   "biases": [[[0.12], [-0.4]], ...],
//!   "weights": [{ "shape": [2, 3], "data": [[...], [...]] }, ...]
//! }
//! ```
//!
//! Layers are ordered input to output and each weight matrix is stored row-major with one row per
//! neuron of the destination layer. Biases are stored as `[n x 1]` nested columns.

use crate::error::{Error, Result};
use crate::network::Network;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedModel {
    pub biases: Vec<Vec<Vec<f64>>>,
    pub weights: Vec<WeightMatrix>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightMatrix {
    /// `[rows, cols]`.
    pub shape: [usize; 2],
    pub data: Vec<Vec<f64>>,
}

impl ExportedModel {
    pub fn from_parameters(biases: &[Array2<f64>], weights: &[Array2<f64>]) -> ExportedModel {
        ExportedModel {
            biases: biases.iter().map(nested_rows).collect(),
            weights: weights
                .iter()
                .map(|weight| WeightMatrix {
                    shape: [weight.nrows(), weight.ncols()],
                    data: nested_rows(weight),
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<ExportedModel> {
        Ok(serde_json::from_str(json)?)
    }

    /// Writes the model as compact JSON, creating parent directories as needed.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        debug!(path = %path.display(), "saved model");
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<ExportedModel> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let model = serde_json::from_reader(reader)?;
        debug!(path = %path.display(), "loaded model");
        Ok(model)
    }

    /// Rebuilds a network from this snapshot. Fails if the stored shapes disagree with the stored
    /// values or do not chain into a valid topology.
    pub fn to_network(&self) -> Result<Network> {
        let biases = self
            .biases
            .iter()
            .enumerate()
            .map(|(i, rows)| {
                let bias = from_nested_rows(rows, &format!("biases[{i}]"))?;
                if bias.ncols() != 1 {
                    return Err(Error::MalformedModel(format!(
                        "biases[{i}] must be a single column, found {} columns",
                        bias.ncols()
                    )));
                }
                Ok(bias)
            })
            .collect::<Result<Vec<_>>>()?;

        let weights = self
            .weights
            .iter()
            .enumerate()
            .map(|(i, weight)| {
                let matrix = from_nested_rows(&weight.data, &format!("weights[{i}]"))?;
                let [rows, cols] = weight.shape;
                if matrix.dim() != (rows, cols) {
                    return Err(Error::MalformedModel(format!(
                        "weights[{i}] declares shape [{rows}, {cols}] but holds {:?}",
                        matrix.dim()
                    )));
                }
                Ok(matrix)
            })
            .collect::<Result<Vec<_>>>()?;

        Network::from_parameters(biases, weights)
    }
}

impl From<&Network> for ExportedModel {
    fn from(network: &Network) -> Self {
        network.export_model()
    }
}

impl TryFrom<&ExportedModel> for Network {
    type Error = Error;

    fn try_from(model: &ExportedModel) -> Result<Network> {
        model.to_network()
    }
}

fn nested_rows(matrix: &Array2<f64>) -> Vec<Vec<f64>> {
    matrix.rows().into_iter().map(|row| row.to_vec()).collect()
}

fn from_nested_rows(rows: &[Vec<f64>], name: &str) -> Result<Array2<f64>> {
    let cols = rows.first().map_or(0, Vec::len);
    if let Some(row) = rows.iter().position(|row| row.len() != cols) {
        return Err(Error::MalformedModel(format!(
            "{name} is ragged: row {row} has {} values, expected {cols}",
            rows[row].len()
        )));
    }
    let flat = rows.iter().flatten().copied().collect();
    Ok(Array2::from_shape_vec((rows.len(), cols), flat)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{TrainingSample, column};
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use ndarray_rand::rand::{SeedableRng, rngs::StdRng};

    fn network() -> Network {
        Network::new_using(vec![4, 3, 2], &mut StdRng::seed_from_u64(99)).unwrap()
    }

    #[test]
    fn export_keeps_shapes_and_row_major_values() {
        let network = Network::from_parameters(
            vec![array![[0.5], [-0.5]]],
            vec![array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]],
        )
        .unwrap();
        let model = network.export_model();

        assert_eq!(model.biases, vec![vec![vec![0.5], vec![-0.5]]]);
        assert_eq!(model.weights[0].shape, [2, 3]);
        assert_eq!(
            model.weights[0].data,
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]
        );
    }

    #[test]
    fn export_is_a_deep_copy() {
        let mut network = network();
        let model = network.export_model();
        let snapshot = model.clone();

        let training_data = vec![TrainingSample::new(
            column(&[1.0, 0.0, 1.0, 0.0]),
            column(&[1.0, 0.0]),
        )];
        network.update_mini_batch(&training_data, 5.0).unwrap();

        assert_eq!(model, snapshot);
        assert_ne!(network.export_model(), model);
    }

    #[test]
    fn json_uses_the_persisted_field_layout() {
        let network = Network::from_parameters(
            vec![array![[0.25]]],
            vec![array![[1.0, -1.0]]],
        )
        .unwrap();
        let json = network.export_model().to_json().unwrap();
        assert_eq!(
            json,
            r#"{"biases":[[[0.25]]],"weights":[{"shape":[1,2],"data":[[1.0,-1.0]]}]}"#
        );
    }

    #[test]
    fn reimported_network_reproduces_feedforward() {
        let original = network();
        let json = original.export_model().to_json().unwrap();
        let restored = ExportedModel::from_json(&json).unwrap().to_network().unwrap();

        assert_eq!(restored.sizes(), original.sizes());
        let input = column(&[0.1, 0.4, 0.7, 1.0]);
        let expected = original.feedforward(&input).unwrap();
        let actual = restored.feedforward(&input).unwrap();
        for (a, b) in actual.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn save_and_load_round_trip_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("network-weights.json");
        let model = network().export_model();

        model.save_json(&path).unwrap();
        let loaded = ExportedModel::load_json(&path).unwrap();

        let network = Network::try_from(&loaded).unwrap();
        assert_eq!(network.sizes(), &[4, 3, 2]);
        assert_eq!(ExportedModel::from(&network), loaded);
    }

    #[test]
    fn declared_shape_must_match_data() {
        let mut model = network().export_model();
        model.weights[0].shape = [4, 3];
        assert!(matches!(model.to_network(), Err(Error::MalformedModel(_))));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let mut model = network().export_model();
        model.weights[1].data[0].pop();
        assert!(matches!(model.to_network(), Err(Error::MalformedModel(_))));
    }

    #[test]
    fn bias_rows_must_be_single_values() {
        let mut model = network().export_model();
        for row in &mut model.biases[0] {
            row.push(0.0);
        }
        assert!(matches!(model.to_network(), Err(Error::MalformedModel(_))));
    }

    #[test]
    fn layers_must_chain() {
        let mut model = network().export_model();
        model.weights.swap(0, 1);
        model.biases.swap(0, 1);
        assert!(matches!(
            model.to_network(),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn invalid_json_is_reported() {
        assert!(matches!(
            ExportedModel::from_json("{\"biases\": 3}"),
            Err(Error::Json(_))
        ));
    }
}
