//! Error types for the expression-qc library.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum QcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid expression value '{value}' at row {row}, column {col}")]
    InvalidValue {
        value: String,
        row: usize,
        col: usize,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Duplicate {axis} identifier '{id}'")]
    DuplicateId { axis: &'static str, id: String },

    #[error("Missing field '{0}' in sample information")]
    MissingField(String),

    #[error("Sample '{0}' has no entry in the sample metadata")]
    MissingMetadataEntry(String),

    #[error("Sample '{sample}' matches several metadata entries: {attributes:?}")]
    AmbiguousMetadataEntry {
        sample: String,
        attributes: Vec<String>,
    },

    #[error("Sample sums are not finite or their median is zero; sum ratios are undefined")]
    UndefinedRatio,

    #[error("{stage} left an empty matrix ({n_genes} genes x {n_samples} samples)")]
    EmptyResult {
        stage: String,
        n_genes: usize,
        n_samples: usize,
    },

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, QcError>;
