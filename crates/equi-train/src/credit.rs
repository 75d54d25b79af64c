//! Credit scoring pipeline.
//!
//! Runs the full fintech workflow on a credit dataset:
//!
//! 1. **Loading** - read and clean the CSV
//! 2. **Feature engineering** - derived ratios, age groups, income brackets
//! 3. **Splitting** - stratified train / validation / test
//! 4. **Training** - fit every candidate, keep the best validation AUC
//! 5. **Evaluation** - accuracy, AUC and classification report on the test split
//! 6. **Bias audit** - approval rates by age group and income quartile
//! 7. **Explainability** - feature attributions of the selected model
//! 8. **Saving** - model artifact directory and timestamped results file
//!
//! # Example
//!
//! ```rust,ignore
//! use equi_train::{CreditPipeline, TrainingConfig};
//!
//! let pipeline = CreditPipeline::builder()
//!     .config(TrainingConfig::from_file("config/watsonx-training-config.json")?)
//!     .workdir(".")
//!     .on_progress(|u| println!("[{}] {:.0}%", u.stage, u.progress * 100.0))
//!     .build()?;
//!
//! let run = pipeline.run("data/training/fintech/credit_scoring_dataset.csv".as_ref())?;
//! println!("Best model: {}", run.evaluation.model_name);
//! ```

use crate::artifacts::{
    ArtifactWriter, FEATURE_NAMES_FILE, LABEL_ENCODER_FILE, MODEL_FILE, ModelArtifact, SCALER_FILE,
};
use crate::config::{Domain, TrainingConfig, WorkDirs};
use crate::dataset::load_credit_dataset;
use crate::error::{Result, TrainingError};
use crate::estimator::{Classifier, credit_candidates};
use crate::explain::explain;
use crate::features::{CREDIT_CATEGORICAL_FEATURES, StandardScaler, engineer_credit_features, take_rows};
use crate::progress::{ProgressCallback, ProgressTracker, TrainingStage};
use crate::split::stratified_split;
use equi_audit::metrics::{accuracy, classification_report, roc_auc};
use equi_audit::{
    AttributeValue, Bucketing, CandidateScore, CreditEvaluation, FairnessAudit, ReportWriter,
    run_timestamp,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

/// Prefix of credit results files.
pub const CREDIT_RESULTS_PREFIX: &str = "credit_evaluation";

/// Age bins of the bias audit (right-closed).
const AUDIT_AGE_EDGES: [f64; 4] = [0.0, 30.0, 50.0, 100.0];
const AUDIT_AGE_LABELS: [&str; 3] = ["young", "middle", "senior"];
const AUDIT_INCOME_LABELS: [&str; 4] = ["Q1", "Q2", "Q3", "Q4"];

/// Output of a credit pipeline run.
#[derive(Debug, Clone)]
pub struct CreditRun {
    pub evaluation: CreditEvaluation,
    pub artifact: ModelArtifact,
    pub results_path: PathBuf,
    /// Run timestamp shared by the artifact, results file and deployment names.
    pub timestamp: String,
}

/// The credit scoring training pipeline.
///
/// Use [`CreditPipeline::builder()`] to construct one.
pub struct CreditPipeline {
    config: TrainingConfig,
    dirs: WorkDirs,
    progress: ProgressTracker,
}

impl std::fmt::Debug for CreditPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreditPipeline")
            .field("config", &self.config)
            .field("dirs", &self.dirs)
            .finish()
    }
}

/// Index of the highest score; the first candidate wins ties, `None` ranks last.
fn best_candidate(scores: &[CandidateScore]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, score) in scores.iter().enumerate() {
        let auc = score.validation_auc.unwrap_or(f64::NEG_INFINITY);
        if best.is_none_or(|(_, b)| auc > b) {
            best = Some((i, auc));
        }
    }
    best.map(|(i, _)| i)
}

/// Turn class-`1` probabilities into probabilities of the unfavorable class.
fn unfavorable_probabilities(positive: &[f64], favorable_index: usize) -> Vec<f64> {
    if favorable_index == 1 {
        positive.iter().map(|p| 1.0 - p).collect()
    } else {
        positive.to_vec()
    }
}

impl CreditPipeline {
    #[must_use]
    pub fn builder() -> CreditPipelineBuilder {
        CreditPipelineBuilder::default()
    }

    #[must_use]
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    #[must_use]
    pub fn dirs(&self) -> &WorkDirs {
        &self.dirs
    }

    /// Train, evaluate, audit and save a credit model from `dataset`.
    ///
    /// # Errors
    ///
    /// Fails fast on a missing or malformed dataset, an unknown favorable
    /// label, or a failed fit. A [`TrainingStage::Failed`] update is emitted
    /// before the error is returned.
    pub fn run(&self, dataset: &Path) -> Result<CreditRun> {
        let result = self.execute(dataset);
        if let Err(e) = &result {
            self.progress.stage(TrainingStage::Failed, 1.0, e.to_string());
        }
        result
    }

    fn execute(&self, dataset: &Path) -> Result<CreditRun> {
        let progress = &self.progress;
        let training = &self.config.training;
        let timestamp = run_timestamp();

        progress.stage(TrainingStage::Initializing, 0.0, "Starting credit scoring pipeline");
        self.dirs.create()?;

        progress.stage(TrainingStage::LoadingData, 0.05, "Loading credit dataset");
        let records = load_credit_dataset(dataset)?;

        progress.stage(TrainingStage::FeatureEngineering, 0.15, "Engineering features");
        let features = engineer_credit_features(&records)?;
        let split = stratified_split(
            &features.labels,
            training.test_size,
            training.validation_fraction,
            training.random_seed,
        )?;

        let x_train = take_rows(&features.rows, &split.train);
        let x_val = take_rows(&features.rows, &split.validation);
        let x_test = take_rows(&features.rows, &split.test);
        let y_train = take_rows(&features.labels, &split.train);
        let y_val = take_rows(&features.labels, &split.validation);
        let y_test = take_rows(&features.labels, &split.test);
        let scaler = StandardScaler::fit(&x_train)?;

        let mut candidates = credit_candidates(&self.config.models.fintech.credit_scoring);
        let mut model_comparison = Vec::with_capacity(candidates.len());
        let val_positive: Vec<bool> = y_val.iter().map(|&y| y == 1).collect();
        let step = 0.4 / candidates.len() as f64;

        for (i, model) in candidates.iter_mut().enumerate() {
            progress.model(0.2 + step * i as f64, model.name());
            let (train_rows, val_rows) = if model.needs_scaling() {
                (scaler.transform(&x_train), scaler.transform(&x_val))
            } else {
                (x_train.clone(), x_val.clone())
            };
            model.fit(&train_rows, &y_train)?;

            let validation_auc = roc_auc(&val_positive, &model.predict_proba(&val_rows)?)?;
            match validation_auc {
                Some(auc) => info!("{} validation AUC: {:.4}", model.name(), auc),
                None => info!("{} validation AUC: N/A (single class in validation)", model.name()),
            }
            model_comparison.push(CandidateScore {
                model_name: model.name().to_string(),
                validation_auc,
            });
        }

        let best_index = best_candidate(&model_comparison)
            .ok_or_else(|| TrainingError::TrainingFailed("no candidate models configured".to_string()))?;
        let best: &dyn Classifier = candidates[best_index].as_ref();
        info!("Best model: {}", best.name());

        progress.stage(TrainingStage::Evaluation, 0.6, format!("Evaluating {}", best.name()));
        let test_rows = if best.needs_scaling() {
            scaler.transform(&x_test)
        } else {
            x_test
        };
        let probabilities = best.predict_proba(&test_rows)?;
        let predicted = best.predict(&test_rows)?;

        let decode = |labels: &[usize]| -> Result<Vec<String>> {
            labels
                .iter()
                .map(|&y| {
                    features
                        .label_encoder
                        .inverse(y)
                        .map(str::to_string)
                        .ok_or_else(|| TrainingError::InvalidData(format!("unknown class index {}", y)))
                })
                .collect()
        };
        let actual_labels = decode(&y_test)?;
        let predicted_labels = decode(&predicted)?;

        let test_accuracy = accuracy(&predicted, &y_test)?;
        let test_positive: Vec<bool> = y_test.iter().map(|&y| y == 1).collect();
        let auc_score = roc_auc(&test_positive, &probabilities)?;
        let report = classification_report(&actual_labels, &predicted_labels)?;
        info!("Test accuracy: {:.4}", test_accuracy);
        if let Some(auc) = auc_score {
            info!("Test AUC: {:.4}", auc);
        }

        progress.stage(TrainingStage::BiasAudit, 0.7, "Running bias detection analysis");
        let favorable = &self.config.audit.favorable_label;
        let favorable_index = features.label_encoder.transform(favorable).ok_or_else(|| {
            TrainingError::InvalidConfig(format!(
                "audit.favorable_label '{}' is not a class of default_risk ({:?})",
                favorable,
                features.label_encoder.classes()
            ))
        })?;
        let test_records = take_rows(&records, &split.test);
        let ages: Vec<AttributeValue> = test_records.iter().map(|r| r.age.into()).collect();
        let incomes: Vec<AttributeValue> = test_records.iter().map(|r| r.income.into()).collect();
        let bias_analysis = FairnessAudit::builder()
            .favorable_label(favorable.clone())
            .attribute(
                "age",
                Bucketing::ranges(&AUDIT_AGE_EDGES, &AUDIT_AGE_LABELS).assign("age", &ages)?,
            )
            .attribute(
                "income",
                Bucketing::quantiles(&AUDIT_INCOME_LABELS).assign("income", &incomes)?,
            )
            .build()?
            .run(&predicted_labels, &unfavorable_probabilities(&probabilities, favorable_index))?;

        progress.stage(TrainingStage::Explainability, 0.8, "Generating explanations");
        let explanations = explain(
            best,
            &test_rows,
            &y_test,
            &features.feature_names,
            self.config.audit.explanation_samples,
            training.random_seed,
        )?;

        progress.stage(TrainingStage::Saving, 0.9, "Saving model and results");
        let mut writer = ArtifactWriter::create(&self.dirs.models(), &format!("credit_model_{}", timestamp))?;
        writer.write_json(MODEL_FILE, &json!({
            "model_type": best.name(),
            "parameters": best.to_artifact()?,
        }))?;
        if best.needs_scaling() {
            writer.write_json(SCALER_FILE, &scaler)?;
        }
        writer.write_json(FEATURE_NAMES_FILE, &features.feature_names)?;

        let mut encoders = serde_json::Map::new();
        encoders.insert("default_risk".to_string(), serde_json::to_value(&features.label_encoder)?);
        for (name, encoder) in CREDIT_CATEGORICAL_FEATURES.iter().zip(&features.categorical_encoders) {
            encoders.insert(name.to_string(), serde_json::to_value(encoder)?);
        }
        writer.write_json(LABEL_ENCODER_FILE, &encoders)?;

        let mut metrics = serde_json::Map::new();
        metrics.insert("accuracy".to_string(), json!(test_accuracy));
        metrics.insert("auc_score".to_string(), json!(auc_score));
        metrics.insert(
            "demographic_parity_difference".to_string(),
            json!(bias_analysis.demographic_parity_difference),
        );
        let artifact = writer.finish(best.name(), Domain::Fintech.as_str(), &timestamp, metrics)?;

        let evaluation = CreditEvaluation {
            model_name: best.name().to_string(),
            accuracy: test_accuracy,
            auc_score,
            classification_report: report,
            bias_analysis,
            explanations,
            model_comparison,
            evaluation_timestamp: timestamp.clone(),
        };
        let results_path =
            ReportWriter::new(self.dirs.results(), CREDIT_RESULTS_PREFIX).write_at(&evaluation, &timestamp)?;

        progress.stage(TrainingStage::Complete, 1.0, "Credit scoring pipeline complete");
        Ok(CreditRun {
            evaluation,
            artifact,
            results_path,
            timestamp,
        })
    }
}

/// Builder for [`CreditPipeline`].
///
/// [`config()`](Self::config) is required; the work directory defaults to
/// the current directory.
#[derive(Default)]
pub struct CreditPipelineBuilder {
    config: Option<TrainingConfig>,
    workdir: Option<PathBuf>,
    progress_callback: Option<ProgressCallback>,
}

impl std::fmt::Debug for CreditPipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreditPipelineBuilder")
            .field("config", &self.config)
            .field("workdir", &self.workdir)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl CreditPipelineBuilder {
    /// Set the training configuration (required).
    #[must_use]
    pub fn config(mut self, config: TrainingConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Root of the `data/`, `models/`, `logs/` and `results/` directories.
    #[must_use]
    pub fn workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    /// Set the progress callback (optional).
    #[must_use]
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(crate::progress::ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_callback = Some(std::sync::Arc::new(callback));
        self
    }

    /// Build the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::InvalidConfig`] if no configuration was set
    /// or it fails validation.
    pub fn build(self) -> Result<CreditPipeline> {
        let config = self
            .config
            .ok_or_else(|| TrainingError::InvalidConfig("config is required".to_string()))?;
        config.validate()?;
        Ok(CreditPipeline {
            config,
            dirs: WorkDirs::new(self.workdir.unwrap_or_else(|| PathBuf::from(".")), Domain::Fintech),
            progress: ProgressTracker::new(self.progress_callback),
        })
    }
}
