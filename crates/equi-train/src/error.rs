//! Error types for the equi-train crate.
//!
//! This module defines [`TrainingError`], the error type returned by every
//! pipeline step. The binaries wrap it in `anyhow` at the top level.
//!
//! # Example
//!
//! ```no_run
//! use equi_train::{TrainingConfig, TrainingError};
//!
//! fn load() -> Result<TrainingConfig, TrainingError> {
//!     // Errors are automatically propagated with ?
//!     let config = TrainingConfig::from_file("config/watsonx-training-config.json")?;
//!     Ok(config)
//! }
//! ```

use equi_audit::AuditError;
use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for training pipeline operations.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// without breaking downstream code.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TrainingError {
    /// Invalid configuration file or builder settings.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The dataset file does not exist.
    #[error("Dataset not found: {path}")]
    DatasetNotFound {
        /// The path that was not found.
        path: String,
    },

    /// The dataset extension is not one the pipeline can read.
    #[error("Unsupported dataset format '{extension}' for {path}")]
    UnsupportedFormat { path: String, extension: String },

    /// Required columns are absent from the dataset.
    #[error("Missing required columns: {0:?}")]
    MissingColumns(Vec<String>),

    /// Dataset content cannot be used for training.
    ///
    /// Common causes:
    /// - No rows left after dropping incomplete records
    /// - A label class too small to stratify
    /// - Non-numeric values in a numeric feature
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Model fitting or selection failed.
    #[error("Training failed: {0}")]
    TrainingFailed(String),

    /// The model host rejected or failed a request.
    #[error("Deployment failed: {0}")]
    DeploymentFailed(String),

    /// Fairness audit or metric failure.
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// Interactive prompt failure (closed stdin, interrupted, ...).
    #[error("Prompt error: {0}")]
    Prompt(#[from] inquire::InquireError),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrainingError {
    /// Stable error code for machine-readable output.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::DatasetNotFound { .. } => "DATASET_NOT_FOUND",
            Self::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            Self::MissingColumns(_) => "MISSING_COLUMNS",
            Self::InvalidData(_) => "INVALID_DATA",
            Self::TrainingFailed(_) => "TRAINING_FAILED",
            Self::DeploymentFailed(_) => "DEPLOYMENT_FAILED",
            Self::Audit(e) => e.error_code(),
            Self::Prompt(_) => "PROMPT_ERROR",
            Self::Http(_) => "HTTP_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for TrainingError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("TrainingError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for training operations.
pub type Result<T> = std::result::Result<T, TrainingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_message() {
        let error = TrainingError::MissingColumns(vec!["dsm_code".to_string(), "language".to_string()]);
        assert_eq!(
            error.to_string(),
            "Missing required columns: [\"dsm_code\", \"language\"]"
        );
        assert_eq!(error.error_code(), "MISSING_COLUMNS");
    }

    #[test]
    fn test_audit_error_code_passes_through() {
        let error: TrainingError = AuditError::ColumnNotFound("age".to_string()).into();
        assert_eq!(error.error_code(), "COLUMN_NOT_FOUND");
        assert!(error.to_string().contains("age"));
    }

    #[test]
    fn test_error_serialization() {
        let error = TrainingError::DatasetNotFound {
            path: "data/training/fintech/credit_scoring_dataset.csv".to_string(),
        };
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["code"], "DATASET_NOT_FOUND");
        assert!(json["message"].as_str().unwrap().contains("credit_scoring_dataset.csv"));
    }
}
