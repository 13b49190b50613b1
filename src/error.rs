//! Error types for the protspace library.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum ProtspaceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported metric '{0}' (supported: euclidean, cosine, manhattan)")]
    UnsupportedMetric(String),

    #[error("Unknown reduction method '{name}' (supported: {supported})")]
    UnknownMethod { name: String, supported: String },

    #[error("Invalid method spec '{0}': expected <name><dims>, e.g. pca2 or umap3")]
    InvalidMethodSpec(String),

    #[error(
        "Shape mismatch for '{identifier}': expected vector of length {expected}, got {actual} \
         ({n_records} records)"
    )]
    ShapeMismatch {
        identifier: String,
        expected: usize,
        actual: usize,
        n_records: usize,
    },

    #[error(
        "Similarity matrix must have matching row and column labels \
         ({n_rows} row labels, {n_cols} column labels)"
    )]
    LabelMismatch { n_rows: usize, n_cols: usize },

    #[error("Projection '{projection}' has {actual} rows but {expected} identifiers were loaded")]
    RowCountMismatch {
        projection: String,
        expected: usize,
        actual: usize,
    },

    #[error("Missing column '{0}'")]
    MissingColumn(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Insufficient data for {method}: need at least {min} samples, got {got}")]
    InsufficientData {
        method: String,
        min: usize,
        got: usize,
    },

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Invalid feature style: {0}")]
    InvalidStyle(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, ProtspaceError>;
