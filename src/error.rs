//! Error types shared by the training and scoring flows

use thiserror::Error;

/// Result type alias used throughout the library
pub type Result<T> = std::result::Result<T, ChurnError>;

/// Every failure aborts the current training run or scoring batch.
#[derive(Error, Debug)]
pub enum ChurnError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Missing value error: column '{column}' {reason}")]
    MissingValue { column: String, reason: String },

    #[error("Artifact load error: {0}")]
    ArtifactLoad(String),

    #[error("Computation error: {0}")]
    Computation(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<polars::error::PolarsError> for ChurnError {
    fn from(err: polars::error::PolarsError) -> Self {
        ChurnError::Data(err.to_string())
    }
}

impl From<serde_json::Error> for ChurnError {
    fn from(err: serde_json::Error) -> Self {
        ChurnError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ChurnError {
    fn from(err: ndarray::ShapeError) -> Self {
        ChurnError::Computation(format!("invalid matrix shape: {}", err))
    }
}

impl From<config::ConfigError> for ChurnError {
    fn from(err: config::ConfigError) -> Self {
        ChurnError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChurnError::MissingValue {
            column: "Tenure".to_string(),
            reason: "has no observed values".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Missing value error: column 'Tenure' has no observed values"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ChurnError = io_err.into();
        assert!(matches!(err, ChurnError::Io(_)));
    }
}
