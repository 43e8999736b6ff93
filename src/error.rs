use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("shape mismatch for {context}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        context: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("cannot update the network from an empty mini-batch")]
    EmptyBatch,

    #[error("invalid hyperparameter: {0}")]
    InvalidHyperparameter(String),

    #[error("malformed model: {0}")]
    MalformedModel(String),

    #[error("malformed data: {0}")]
    MalformedData(String),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Fails with `ShapeMismatch` unless `found` is exactly `expected`.
pub(crate) fn ensure_shape(
    context: impl Into<String>,
    expected: (usize, usize),
    found: (usize, usize),
) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            context: context.into(),
            expected,
            found,
        })
    }
}
