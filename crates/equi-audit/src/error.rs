//! Error types for fairness auditing and report handling.
//!
//! Errors are serializable so they can be embedded in JSON output (for
//! example the `--json` mode of the training binaries).

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the audit crate.
#[derive(Error, Debug)]
pub enum AuditError {
    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// Invalid audit configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Bucketing could not be applied to an attribute.
    #[error("Invalid binning for '{attribute}': {reason}")]
    InvalidBinning { attribute: String, reason: String },

    /// Parallel inputs (predictions, probabilities, groups) disagree in length.
    #[error("Length mismatch: {left_name} has {left} entries but {right_name} has {right}")]
    LengthMismatch {
        left_name: &'static str,
        left: usize,
        right_name: &'static str,
        right: usize,
    },

    /// A metric could not be computed from the given inputs.
    #[error("Failed to compute metric '{metric}': {reason}")]
    MetricFailed { metric: String, reason: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<AuditError>,
    },
}

impl AuditError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        AuditError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable error code for machine-readable output.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::InvalidBinning { .. } => "INVALID_BINNING",
            Self::LengthMismatch { .. } => "LENGTH_MISMATCH",
            Self::MetricFailed { .. } => "METRIC_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    pub(crate) fn check_lengths(
        left_name: &'static str,
        left: usize,
        right_name: &'static str,
        right: usize,
    ) -> Result<()> {
        if left == right {
            Ok(())
        } else {
            Err(AuditError::LengthMismatch {
                left_name,
                left,
                right_name,
                right,
            })
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for AuditError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("AuditError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for audit operations.
pub type Result<T> = std::result::Result<T, AuditError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| AuditError::Polars(e).with_context(context))
    }
}
