//! Evaluation report types and the timestamped JSON report writer.
//!
//! Every pipeline run produces one report file named
//! `<prefix>_<YYYYmmdd_HHMMSS>.json` inside its results directory.

use crate::audit::{AccuracyAudit, FairnessReport};
use crate::error::{AuditError, Result, ResultExt};
use crate::metrics::ClassificationReport;
use chrono::Local;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Timestamp format shared by report files, artifact directories and
/// deployment names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Current local time in [`TIMESTAMP_FORMAT`].
pub fn run_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Importance score of one input feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Model explanation attached to an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    /// `linear_attribution` or `permutation_importance`.
    pub method: String,
    /// Features sorted by descending importance.
    pub feature_importance: Vec<FeatureImportance>,
    /// Per-row attributions for the first explained rows (empty for
    /// permutation importance).
    pub sample_attributions: Vec<Vec<f64>>,
    /// Expected model output over the background data.
    pub base_value: Option<f64>,
}

impl Explanation {
    /// Names of the `n` most important features.
    pub fn top_features(&self, n: usize) -> Vec<&str> {
        self.feature_importance
            .iter()
            .take(n)
            .map(|f| f.feature.as_str())
            .collect()
    }
}

/// Validation score of one candidate model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub model_name: String,
    pub validation_auc: Option<f64>,
}

/// Result file of the credit scoring pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditEvaluation {
    pub model_name: String,
    pub accuracy: f64,
    pub auc_score: Option<f64>,
    pub classification_report: ClassificationReport,
    pub bias_analysis: FairnessReport,
    pub explanations: Explanation,
    pub model_comparison: Vec<CandidateScore>,
    pub evaluation_timestamp: String,
}

/// Losses recorded after one training epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochLog {
    pub epoch: usize,
    pub train_loss: f64,
    pub eval_loss: f64,
}

/// Result file of the DSM classification pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DsmEvaluation {
    pub classification_report: ClassificationReport,
    /// Rows = actual, columns = predicted, both in `labels` order.
    pub confusion_matrix: Vec<Vec<usize>>,
    pub labels: Vec<String>,
    pub cultural_bias_analysis: AccuracyAudit,
    pub overall_accuracy: f64,
    pub macro_f1: f64,
    pub weighted_f1: f64,
    pub language_distribution: BTreeMap<String, usize>,
    /// Cultural context → adaptations applied to its records.
    pub cultural_adaptations: BTreeMap<String, Vec<String>>,
    pub training_history: Vec<EpochLog>,
    pub evaluation_timestamp: String,
}

/// Writes evaluation reports as pretty JSON into a results directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
    prefix: String,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Path of the report for a given run timestamp.
    pub fn path_for(&self, timestamp: &str) -> PathBuf {
        self.dir.join(format!("{}_{}.json", self.prefix, timestamp))
    }

    /// Write `report` stamped with the current time. Returns the file path.
    pub fn write<T: Serialize>(&self, report: &T) -> Result<PathBuf> {
        self.write_at(report, &run_timestamp())
    }

    /// Write `report` under an explicit timestamp, creating the directory.
    pub fn write_at<T: Serialize>(&self, report: &T, timestamp: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .map_err(AuditError::from)
            .context(format!("Creating results directory {}", self.dir.display()))?;

        let path = self.path_for(timestamp);
        let json = serde_json::to_string_pretty(report)?;
        fs::write(&path, json)
            .map_err(AuditError::from)
            .context(format!("Writing report {}", path.display()))?;

        info!("Results saved to {}", path.display());
        Ok(path)
    }
}

/// Read a report previously written by [`ReportWriter`].
pub fn read_report<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .map_err(AuditError::from)
        .context(format!("Reading report {}", path.display()))?;
    Ok(serde_json::from_str(&content)?)
}
