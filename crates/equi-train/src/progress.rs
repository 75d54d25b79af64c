//! Progress reporting types for the training pipelines.
//!
//! Both pipelines move through the same [`TrainingStage`]s. Every stage
//! change is logged and, when a [`ProgressCallback`] is registered, forwarded
//! to it as a [`ProgressUpdate`].
//!
//! # Example
//!
//! ```
//! use equi_train::{ProgressUpdate, TrainingStage};
//! use std::sync::Arc;
//!
//! let callback: equi_train::ProgressCallback = Arc::new(|update: ProgressUpdate| {
//!     println!("[{}] {:.0}% - {}", update.stage, update.progress * 100.0, update.message);
//! });
//! callback(ProgressUpdate {
//!     stage: TrainingStage::Training,
//!     progress: 0.4,
//!     message: "Training logistic_regression".to_string(),
//!     current_model: Some("logistic_regression".to_string()),
//! });
//! ```

use std::fmt;
use std::sync::Arc;
use tracing::info;

/// The current stage of a training pipeline.
///
/// Terminal states: [`Complete`](Self::Complete), [`Failed`](Self::Failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TrainingStage {
    /// Configuration loaded, directories being prepared.
    #[default]
    Initializing,
    /// Reading and validating the dataset.
    LoadingData,
    /// Deriving and encoding features.
    FeatureEngineering,
    /// Fitting candidate models.
    Training,
    /// Scoring the held-out test split.
    Evaluation,
    /// Group-wise fairness analysis.
    BiasAudit,
    /// Feature attributions / importances.
    Explainability,
    /// Writing artifacts and result files.
    Saving,
    /// Finished successfully.
    Complete,
    /// Stopped on an error.
    Failed,
}

impl TrainingStage {
    /// Returns the snake_case name used in logs.
    ///
    /// # Examples
    ///
    /// ```
    /// use equi_train::TrainingStage;
    ///
    /// assert_eq!(TrainingStage::BiasAudit.as_str(), "bias_audit");
    /// ```
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingStage::Initializing => "initializing",
            TrainingStage::LoadingData => "loading_data",
            TrainingStage::FeatureEngineering => "feature_engineering",
            TrainingStage::Training => "training",
            TrainingStage::Evaluation => "evaluation",
            TrainingStage::BiasAudit => "bias_audit",
            TrainingStage::Explainability => "explainability",
            TrainingStage::Saving => "saving",
            TrainingStage::Complete => "complete",
            TrainingStage::Failed => "failed",
        }
    }
}

impl fmt::Display for TrainingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A progress update from a training pipeline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgressUpdate {
    /// The current training stage.
    pub stage: TrainingStage,
    /// Overall progress from 0.0 to 1.0.
    pub progress: f64,
    /// Human-readable status message.
    pub message: String,
    /// Name of the model being fitted, during [`TrainingStage::Training`].
    pub current_model: Option<String>,
}

/// Type alias for a progress callback function.
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Logs stage changes and forwards them to an optional callback.
#[derive(Clone, Default)]
pub(crate) struct ProgressTracker {
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Option<ProgressCallback>) -> Self {
        Self { callback }
    }

    pub(crate) fn stage(&self, stage: TrainingStage, progress: f64, message: impl Into<String>) {
        self.emit(stage, progress, message.into(), None);
    }

    pub(crate) fn model(&self, progress: f64, model: &str) {
        self.emit(
            TrainingStage::Training,
            progress,
            format!("Training {}", model),
            Some(model.to_string()),
        );
    }

    fn emit(&self, stage: TrainingStage, progress: f64, message: String, current_model: Option<String>) {
        info!(stage = %stage, "{}", message);
        if let Some(callback) = &self.callback {
            callback(ProgressUpdate {
                stage,
                progress,
                message,
                current_model,
            });
        }
    }
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
