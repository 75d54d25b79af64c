//! DSM-5-TR classification pipeline.
//!
//! Trains a [`TextClassifier`] that maps free-text symptom descriptions to
//! DSM categories, then audits accuracy across cultural contexts.
//!
//! # Example
//!
//! ```rust,ignore
//! use equi_train::{DsmPipeline, TrainingConfig};
//!
//! let run = DsmPipeline::builder()
//!     .config(TrainingConfig::from_file("config/watsonx-training-config.json")?)
//!     .build()?
//!     .run("data/training/mental-health/dsm-5-tr-dataset.csv".as_ref())?;
//! println!("Accuracy: {:.3}", run.evaluation.overall_accuracy);
//! ```

use crate::artifacts::{ArtifactWriter, LABEL_ENCODER_FILE, MODEL_FILE, ModelArtifact};
use crate::config::{Domain, TrainingConfig, WorkDirs};
use crate::dataset::{DsmRecord, load_dsm_dataset};
use crate::error::{Result, TrainingError};
use crate::features::{LabelEncoder, take_rows};
use crate::progress::{ProgressCallback, ProgressTracker, TrainingStage};
use crate::split::stratified_split;
use crate::text::{TextClassifier, TextClassifierParams};
use equi_audit::metrics::{accuracy, classification_report, confusion_matrix};
use equi_audit::{DsmEvaluation, ReportWriter, audit_accuracy_by_group, run_timestamp};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Prefix of DSM results files.
pub const DSM_RESULTS_PREFIX: &str = "evaluation";

/// Languages reported separately.
pub const SUPPORTED_LANGUAGES: [&str; 3] = ["en", "sw", "fr"];

/// Adaptations applied to records of each known cultural context.
pub static CULTURAL_ADAPTATIONS: [(&str, [&str; 3]); 3] = [
    (
        "East African",
        ["somatic_emphasis", "family_involvement", "spiritual_context"],
    ),
    (
        "West African",
        ["community_focus", "traditional_healing", "collective_identity"],
    ),
    (
        "European",
        ["individual_focus", "medical_model", "privacy_emphasis"],
    ),
];

/// Adaptations for `context`, empty for unknown contexts.
pub fn adaptations_for(context: &str) -> &'static [&'static str] {
    CULTURAL_ADAPTATIONS
        .iter()
        .find(|(name, _)| *name == context)
        .map(|(_, adaptations)| adaptations.as_slice())
        .unwrap_or(&[])
}

/// Record the adaptations of each record's cultural context on the record.
///
/// Returns the context → adaptations summary for contexts present.
pub fn apply_cultural_adaptations(records: &mut [DsmRecord]) -> BTreeMap<String, Vec<String>> {
    info!("Applying cultural adaptations...");
    let mut summary = BTreeMap::new();
    for record in records.iter_mut() {
        let Some(context) = record.cultural_context.as_deref() else {
            continue;
        };
        let adaptations: Vec<String> = adaptations_for(context).iter().map(|a| a.to_string()).collect();
        if !adaptations.is_empty() {
            summary.insert(context.to_string(), adaptations.clone());
        }
        record.cultural_adaptations = adaptations;
    }
    summary
}

/// Number of records per supported language; languages without records are omitted.
pub fn partition_languages(records: &[DsmRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for language in SUPPORTED_LANGUAGES {
        let n = records
            .iter()
            .filter(|r| r.language.as_deref() == Some(language))
            .count();
        if n > 0 {
            info!("  {}: {} samples", language.to_uppercase(), n);
            counts.insert(language.to_string(), n);
        }
    }
    counts
}

/// Output of a DSM pipeline run.
#[derive(Debug, Clone)]
pub struct DsmRun {
    pub evaluation: DsmEvaluation,
    pub artifact: ModelArtifact,
    pub results_path: PathBuf,
    pub timestamp: String,
}

/// The DSM classification training pipeline.
pub struct DsmPipeline {
    config: TrainingConfig,
    dirs: WorkDirs,
    progress: ProgressTracker,
}

impl std::fmt::Debug for DsmPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DsmPipeline")
            .field("config", &self.config)
            .field("dirs", &self.dirs)
            .finish()
    }
}

impl DsmPipeline {
    #[must_use]
    pub fn builder() -> DsmPipelineBuilder {
        DsmPipelineBuilder::default()
    }

    #[must_use]
    pub fn dirs(&self) -> &WorkDirs {
        &self.dirs
    }

    fn classifier_params(&self) -> TextClassifierParams {
        let dsm = &self.config.models.mental_health.dsm_classification;
        let training = &self.config.training;
        TextClassifierParams {
            max_length: dsm.max_length,
            vocabulary_size: dsm.vocabulary_size,
            epochs: training.epochs,
            batch_size: training.batch_size,
            learning_rate: training.learning_rate,
            early_stopping_patience: training.early_stopping_patience,
            seed: training.random_seed,
        }
    }

    /// Train, evaluate and save a DSM classifier from `dataset`.
    ///
    /// Emits [`TrainingStage::Failed`] before returning an error.
    pub fn run(&self, dataset: &Path) -> Result<DsmRun> {
        let result = self.execute(dataset);
        if let Err(e) = &result {
            self.progress.stage(TrainingStage::Failed, 1.0, e.to_string());
        }
        result
    }

    fn execute(&self, dataset: &Path) -> Result<DsmRun> {
        let progress = &self.progress;
        let training = &self.config.training;
        let timestamp = run_timestamp();

        progress.stage(TrainingStage::Initializing, 0.0, "Starting DSM-5-TR pipeline");
        self.dirs.create()?;

        progress.stage(TrainingStage::LoadingData, 0.05, "Loading DSM dataset");
        let mut records = load_dsm_dataset(dataset)?;

        progress.stage(TrainingStage::FeatureEngineering, 0.15, "Preparing multilingual data");
        let language_distribution = partition_languages(&records);
        let cultural_adaptations = apply_cultural_adaptations(&mut records);

        let label_encoder = LabelEncoder::fit(records.iter().map(|r| r.dsm_category.as_str()));
        let categories: Vec<&str> = records.iter().map(|r| r.dsm_category.as_str()).collect();
        let labels = label_encoder.transform_all(&categories)?;
        let split = stratified_split(
            &labels,
            training.test_size,
            training.validation_fraction,
            training.random_seed,
        )?;

        let documents: Vec<String> = records.iter().map(|r| r.symptoms.clone()).collect();
        let train_docs = take_rows(&documents, &split.train);
        let val_docs = take_rows(&documents, &split.validation);
        let test_docs = take_rows(&documents, &split.test);
        let y_train = take_rows(&labels, &split.train);
        let y_val = take_rows(&labels, &split.validation);
        let y_test = take_rows(&labels, &split.test);

        let params = self.classifier_params();
        progress.model(0.2, &model_name(&self.config));
        let mut model = TextClassifier::new(params);
        let training_history =
            model.fit(&train_docs, &y_train, &val_docs, &y_val, label_encoder.len())?;
        info!("Training completed after {} epochs", training_history.len());

        progress.stage(TrainingStage::Evaluation, 0.7, "Evaluating DSM classifier");
        let predicted = model.predict(&test_docs)?;
        let decode = |indices: &[usize]| -> Result<Vec<String>> {
            indices
                .iter()
                .map(|&i| {
                    label_encoder
                        .inverse(i)
                        .map(str::to_string)
                        .ok_or_else(|| TrainingError::InvalidData(format!("unknown class index {}", i)))
                })
                .collect()
        };
        let actual_labels = decode(&y_test)?;
        let predicted_labels = decode(&predicted)?;

        let report = classification_report(&actual_labels, &predicted_labels)?;
        let all_classes: Vec<usize> = (0..label_encoder.len()).collect();
        let matrix = confusion_matrix(&y_test, &predicted, &all_classes)?;
        let overall_accuracy = accuracy(&predicted, &y_test)?;
        info!("Test accuracy: {:.4}", overall_accuracy);

        progress.stage(TrainingStage::BiasAudit, 0.8, "Analyzing cultural bias");
        let contexts: Vec<Option<String>> = take_rows(&records, &split.test)
            .into_iter()
            .map(|r| r.cultural_context)
            .collect();
        let cultural_bias_analysis =
            audit_accuracy_by_group(&predicted_labels, &actual_labels, &contexts)?;
        for (culture, stats) in &cultural_bias_analysis.groups {
            info!("  {}: accuracy {:.3} ({} samples)", culture, stats.accuracy, stats.sample_size);
        }

        progress.stage(TrainingStage::Saving, 0.9, "Saving model and results");
        let mut writer = ArtifactWriter::create(&self.dirs.models(), &format!("dsm-classifier-{}", timestamp))?;
        writer.write_json(MODEL_FILE, &model)?;
        writer.write_json(LABEL_ENCODER_FILE, &label_encoder)?;

        let macro_f1 = report.macro_avg.f1_score;
        let weighted_f1 = report.weighted_avg.f1_score;
        let mut metrics = serde_json::Map::new();
        metrics.insert("overall_accuracy".to_string(), json!(overall_accuracy));
        metrics.insert("macro_f1".to_string(), json!(macro_f1));
        metrics.insert("cultural_adaptations".to_string(), json!(cultural_adaptations));
        let artifact = writer.finish(
            &model_name(&self.config),
            Domain::MentalHealth.as_str(),
            &timestamp,
            metrics,
        )?;

        let evaluation = DsmEvaluation {
            classification_report: report,
            confusion_matrix: matrix,
            labels: label_encoder.classes().to_vec(),
            cultural_bias_analysis,
            overall_accuracy,
            macro_f1,
            weighted_f1,
            language_distribution,
            cultural_adaptations,
            training_history,
            evaluation_timestamp: timestamp.clone(),
        };
        let results_path =
            ReportWriter::new(self.dirs.results(), DSM_RESULTS_PREFIX).write_at(&evaluation, &timestamp)?;

        progress.stage(TrainingStage::Complete, 1.0, "DSM-5-TR pipeline complete");
        Ok(DsmRun {
            evaluation,
            artifact,
            results_path,
            timestamp,
        })
    }
}

fn model_name(config: &TrainingConfig) -> String {
    config.models.mental_health.dsm_classification.base_model.clone()
}

/// Builder for [`DsmPipeline`]; [`config()`](Self::config) is required.
#[derive(Default)]
pub struct DsmPipelineBuilder {
    config: Option<TrainingConfig>,
    workdir: Option<PathBuf>,
    progress_callback: Option<ProgressCallback>,
}

impl std::fmt::Debug for DsmPipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DsmPipelineBuilder")
            .field("config", &self.config)
            .field("workdir", &self.workdir)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl DsmPipelineBuilder {
    #[must_use]
    pub fn config(mut self, config: TrainingConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    #[must_use]
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(crate::progress::ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_callback = Some(std::sync::Arc::new(callback));
        self
    }

    pub fn build(self) -> Result<DsmPipeline> {
        let config = self
            .config
            .ok_or_else(|| TrainingError::InvalidConfig("config is required".to_string()))?;
        config.validate()?;
        Ok(DsmPipeline {
            config,
            dirs: WorkDirs::new(
                self.workdir.unwrap_or_else(|| PathBuf::from(".")),
                Domain::MentalHealth,
            ),
            progress: ProgressTracker::new(self.progress_callback),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(context: Option<&str>, language: &str) -> DsmRecord {
        DsmRecord {
            symptoms: "low mood".to_string(),
            dsm_category: "Depressive".to_string(),
            dsm_code: Some("F32".to_string()),
            language: Some(language.to_string()),
            cultural_context: context.map(str::to_string),
            cultural_adaptations: Vec::new(),
        }
    }

    #[test]
    fn test_adaptations_for() {
        assert_eq!(
            adaptations_for("West African"),
            &["community_focus", "traditional_healing", "collective_identity"]
        );
        assert!(adaptations_for("South Asian").is_empty());
    }

    #[test]
    fn test_apply_cultural_adaptations() {
        let mut records = vec![
            record(Some("East African"), "sw"),
            record(Some("Latin American"), "en"),
            record(None, "fr"),
        ];
        let summary = apply_cultural_adaptations(&mut records);

        assert_eq!(
            records[0].cultural_adaptations,
            vec!["somatic_emphasis", "family_involvement", "spiritual_context"]
        );
        assert!(records[1].cultural_adaptations.is_empty());
        assert!(records[2].cultural_adaptations.is_empty());
        assert_eq!(summary.keys().collect::<Vec<_>>(), vec!["East African"]);
    }

    #[test]
    fn test_partition_languages() {
        let records = vec![
            record(None, "en"),
            record(None, "sw"),
            record(None, "en"),
            record(None, "de"),
        ];
        let counts = partition_languages(&records);
        assert_eq!(counts.len(), 2);
        assert_eq!(counts["en"], 2);
        assert_eq!(counts["sw"], 1);
        assert!(!counts.contains_key("fr"));
    }

    #[test]
    fn test_builder_requires_config() {
        let err = DsmPipeline::builder().build().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }
}
