//! Error types for key driver analysis.

use ndarray::ShapeError;
use thiserror::Error;

/// Result type alias for key driver operations.
pub type Result<T> = std::result::Result<T, KeyDriverError>;

/// Errors that can occur during a key driver analysis.
///
/// The first group aborts an analysis run. `Backend` is only ever produced by
/// an attribution explainer and is downgraded to a warning by the pipeline.
#[derive(Error, Debug)]
pub enum KeyDriverError {
    /// Wrong number of outcome or driver variables.
    #[error("Invalid driver count: {0}")]
    InvalidDriverCount(String),
    /// Not enough complete respondents after row filtering.
    #[error("Insufficient data: {n} usable respondents, at least {required} required")]
    InsufficientData { n: usize, required: usize },
    /// A variable is constant across all usable respondents.
    #[error("Variable '{0}' has zero variance")]
    ZeroVariance(String),
    /// Perfect or near-perfect collinearity among the named drivers.
    #[error("Aliased coefficients: drivers {} are linearly dependent", .0.join(", "))]
    AliasedCoefficients(Vec<String>),
    /// Exact Shapley enumeration was requested for too many drivers.
    #[error("Too many drivers for exact Shapley decomposition: {0}")]
    TooManyDrivers(usize),
    /// Inconsistent variable configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// A configured column is absent from the input table.
    #[error("Missing column: {0}")]
    MissingColumn(String),
    /// Malformed input data.
    #[error("Invalid input data: {0}")]
    InvalidInput(String),
    /// Weight column contains values that cannot be used.
    #[error("Invalid weights: {0}")]
    InvalidWeights(String),
    /// A decomposition or solve failed.
    #[error("Numerical error: {0}")]
    Numerical(String),
    /// An error from a gradient boosting backend.
    #[error("Backend error: {0}")]
    Backend(String),
    /// An observer asked the run to stop.
    #[error("Analysis cancelled")]
    Cancelled,
    /// A serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Shape mismatch in arrays.
    #[error("Shape mismatch: expected {expected_shape}, got {actual_shape}")]
    ShapeMismatch {
        expected_shape: String,
        actual_shape: String,
    },
}

impl KeyDriverError {
    /// Whether the error must abort a whole analysis run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, KeyDriverError::Backend(_))
    }
}

impl From<ShapeError> for KeyDriverError {
    fn from(err: ShapeError) -> Self {
        KeyDriverError::ShapeMismatch {
            expected_shape: "unknown".to_string(),
            actual_shape: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for KeyDriverError {
    fn from(err: serde_json::Error) -> Self {
        KeyDriverError::Serialization(err.to_string())
    }
}
