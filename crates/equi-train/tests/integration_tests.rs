//! Integration tests for the training pipelines.
//!
//! Both pipelines run end to end on small fixture datasets inside temporary
//! work directories; deployment goes through an in-memory model host.

use equi_audit::{CreditEvaluation, DsmEvaluation, read_report};
use equi_train::artifacts::{
    FEATURE_NAMES_FILE, LABEL_ENCODER_FILE, METADATA_FILE, MODEL_FILE, read_artifact_file,
};
use equi_train::deploy::{DeploymentMetadata, ModelMetadata};
use equi_train::{
    CreditPipeline, DeploymentKind, DsmPipeline, ModelHost, ProgressUpdate, TextClassifier,
    TrainingConfig, TrainingError, TrainingStage, deploy_artifact, load_dsm_dataset, read_metadata,
};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn test_config() -> TrainingConfig {
    TrainingConfig::builder()
        .epochs(15)
        .batch_size(4)
        .build()
        .expect("default configuration should validate")
}

fn recorder() -> (Arc<Mutex<Vec<ProgressUpdate>>>, impl Fn(ProgressUpdate) + Send + Sync + 'static) {
    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&updates);
    (updates, move |update| sink.lock().unwrap().push(update))
}

/// Model host that records uploads instead of calling a remote service.
#[derive(Default)]
struct InMemoryHost {
    stored: Mutex<Vec<(PathBuf, ModelMetadata)>>,
    deployed: Mutex<Vec<(String, DeploymentMetadata)>>,
}

impl ModelHost for InMemoryHost {
    fn store_model(&self, artifact_dir: &Path, metadata: &ModelMetadata) -> equi_train::Result<String> {
        let mut stored = self.stored.lock().unwrap();
        stored.push((artifact_dir.to_path_buf(), metadata.clone()));
        Ok(format!("model-{}", stored.len()))
    }

    fn create_online_deployment(
        &self,
        model_id: &str,
        metadata: &DeploymentMetadata,
    ) -> equi_train::Result<String> {
        let mut deployed = self.deployed.lock().unwrap();
        deployed.push((model_id.to_string(), metadata.clone()));
        Ok(format!("deployment-{}", deployed.len()))
    }
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_shipped_config_loads() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/watsonx-training-config.json");
    let config = TrainingConfig::from_file(&path).unwrap();

    assert_eq!(config.training.random_seed, 42);
    assert_eq!(config.training.test_size, 0.3);
    assert_eq!(config.audit.favorable_label, "0");
    assert_eq!(config.models.mental_health.dsm_classification.max_length, 512);
}

// ============================================================================
// Credit Pipeline
// ============================================================================

#[test]
fn test_credit_pipeline_end_to_end() {
    let workdir = tempfile::tempdir().unwrap();
    let (updates, on_progress) = recorder();

    let run = CreditPipeline::builder()
        .config(test_config())
        .workdir(workdir.path())
        .on_progress(on_progress)
        .build()
        .unwrap()
        .run(&fixtures_path().join("credit_scoring_dataset.csv"))
        .unwrap();

    let evaluation = &run.evaluation;
    assert_eq!(evaluation.model_comparison.len(), 2);
    assert!(
        evaluation
            .model_comparison
            .iter()
            .any(|c| c.model_name == evaluation.model_name)
    );
    assert!((0.0..=1.0).contains(&evaluation.accuracy));
    assert!(evaluation.auc_score.is_some());

    // Bias analysis groups are scoped by attribute and non-empty
    let bias = &evaluation.bias_analysis;
    assert_eq!(bias.favorable_label, "0");
    assert!(!bias.groups.is_empty());
    for (key, stats) in &bias.groups {
        assert!(key.starts_with("age_") || key.starts_with("income_"), "{key}");
        assert!(stats.sample_size > 0);
        assert!((0.0..=1.0).contains(&stats.approval_rate));
    }
    let rates: Vec<f64> = bias.groups.values().map(|g| g.approval_rate).collect();
    let max = rates.iter().copied().fold(f64::MIN, f64::max);
    let min = rates.iter().copied().fold(f64::MAX, f64::min);
    assert_eq!(bias.demographic_parity_difference, Some(max - min));

    // Explanation covers every engineered feature
    assert_eq!(evaluation.explanations.feature_importance.len(), 8);
    assert!(evaluation.explanations.sample_attributions.len() <= 10);

    // Results file round-trips
    assert!(run.results_path.starts_with(workdir.path().join("results/fintech")));
    let file_name = run.results_path.file_name().unwrap().to_string_lossy().to_string();
    assert_eq!(file_name, format!("credit_evaluation_{}.json", run.timestamp));
    let reloaded: CreditEvaluation = read_report(&run.results_path).unwrap();
    assert_eq!(&reloaded, evaluation);

    // Artifact directory
    assert!(run.artifact.dir.ends_with(format!("credit_model_{}", run.timestamp)));
    let metadata = read_metadata(&run.artifact.dir).unwrap();
    for file in [MODEL_FILE, FEATURE_NAMES_FILE, LABEL_ENCODER_FILE, METADATA_FILE] {
        assert!(metadata.files.iter().any(|f| f == file), "missing {file}");
        assert!(run.artifact.dir.join(file).exists());
    }
    let names: Vec<String> = read_artifact_file(&run.artifact.dir, FEATURE_NAMES_FILE).unwrap();
    assert_eq!(names[4], "debt_to_income");

    // Progress ends in Complete
    let updates = updates.lock().unwrap();
    assert_eq!(updates.first().unwrap().stage, TrainingStage::Initializing);
    assert_eq!(updates.last().unwrap().stage, TrainingStage::Complete);
    assert!(updates.iter().any(|u| u.current_model.as_deref() == Some("gaussian_nb")));
}

#[test]
fn test_credit_pipeline_is_reproducible() {
    let dataset = fixtures_path().join("credit_scoring_dataset.csv");
    let run = |dir: &Path| {
        CreditPipeline::builder()
            .config(test_config())
            .workdir(dir)
            .build()
            .unwrap()
            .run(&dataset)
            .unwrap()
            .evaluation
    };

    let a = run(tempfile::tempdir().unwrap().path());
    let b = run(tempfile::tempdir().unwrap().path());
    assert_eq!(a.model_comparison, b.model_comparison);
    assert_eq!(a.bias_analysis, b.bias_analysis);
    assert_eq!(a.classification_report, b.classification_report);
}

#[test]
fn test_credit_pipeline_rerun_in_same_workdir() {
    let workdir = tempfile::tempdir().unwrap();
    let pipeline = CreditPipeline::builder()
        .config(test_config())
        .workdir(workdir.path())
        .build()
        .unwrap();
    let dataset = fixtures_path().join("credit_scoring_dataset.csv");

    let first = pipeline.run(&dataset).unwrap();
    let second = pipeline.run(&dataset).unwrap();

    // Runs in the same second share a directory name; the later run wins
    let metadata = read_metadata(&second.artifact.dir).unwrap();
    assert_eq!(metadata, second.artifact.metadata);
    assert!(first.artifact.dir.exists());
    let reloaded: CreditEvaluation = read_report(&second.results_path).unwrap();
    assert_eq!(reloaded, second.evaluation);
}

#[test]
fn test_credit_group_probability_follows_favorable_label() {
    let dataset = fixtures_path().join("credit_scoring_dataset.csv");
    let audit_with = |favorable: &str| {
        let workdir = tempfile::tempdir().unwrap();
        let config = TrainingConfig::builder()
            .epochs(15)
            .batch_size(4)
            .favorable_label(favorable)
            .build()
            .unwrap();
        CreditPipeline::builder()
            .config(config)
            .workdir(workdir.path())
            .build()
            .unwrap()
            .run(&dataset)
            .unwrap()
            .evaluation
            .bias_analysis
    };

    let no_default = audit_with("0");
    let default = audit_with("1");
    assert_eq!(
        no_default.groups.keys().collect::<Vec<_>>(),
        default.groups.keys().collect::<Vec<_>>()
    );

    // Approval and unfavorable probability both swap sides with the label
    for (key, stats) in &no_default.groups {
        let flipped = &default.groups[key];
        assert_eq!(stats.sample_size, flipped.sample_size);
        assert!((stats.approval_rate + flipped.approval_rate - 1.0).abs() < 1e-9, "{key}");
        assert!((stats.avg_probability + flipped.avg_probability - 1.0).abs() < 1e-9, "{key}");
    }
}

#[test]
fn test_credit_pipeline_rejects_unknown_favorable_label() {
    let workdir = tempfile::tempdir().unwrap();
    let (updates, on_progress) = recorder();
    let config = TrainingConfig::builder().favorable_label("approved").build().unwrap();

    let err = CreditPipeline::builder()
        .config(config)
        .workdir(workdir.path())
        .on_progress(on_progress)
        .build()
        .unwrap()
        .run(&fixtures_path().join("credit_scoring_dataset.csv"))
        .unwrap_err();

    assert_eq!(err.error_code(), "INVALID_CONFIG");
    assert!(err.to_string().contains("approved"));
    assert_eq!(updates.lock().unwrap().last().unwrap().stage, TrainingStage::Failed);
}

#[test]
fn test_credit_pipeline_missing_dataset() {
    let workdir = tempfile::tempdir().unwrap();
    let err = CreditPipeline::builder()
        .config(test_config())
        .workdir(workdir.path())
        .build()
        .unwrap()
        .run(&workdir.path().join("missing.csv"))
        .unwrap_err();

    assert!(matches!(err, TrainingError::DatasetNotFound { .. }));
}

#[test]
fn test_credit_pipeline_rejects_json_dataset() {
    let workdir = tempfile::tempdir().unwrap();
    let path = workdir.path().join("applicants.json");
    std::fs::write(&path, "[]").unwrap();

    let err = CreditPipeline::builder()
        .config(test_config())
        .workdir(workdir.path())
        .build()
        .unwrap()
        .run(&path)
        .unwrap_err();

    assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");
}

#[test]
fn test_credit_deployment_through_host() {
    let workdir = tempfile::tempdir().unwrap();
    let run = CreditPipeline::builder()
        .config(test_config())
        .workdir(workdir.path())
        .build()
        .unwrap()
        .run(&fixtures_path().join("credit_scoring_dataset.csv"))
        .unwrap();

    let host = InMemoryHost::default();
    let kind = DeploymentKind::Credit {
        model_name: run.evaluation.model_name.clone(),
    };
    let ids = deploy_artifact(&host, &run.artifact.dir, &kind, &run.timestamp).unwrap();

    assert_eq!(ids.model_id, "model-1");
    assert_eq!(ids.deployment_id, "deployment-1");

    let stored = host.stored.lock().unwrap();
    assert_eq!(stored[0].0, run.artifact.dir);
    assert_eq!(
        stored[0].1.name,
        format!("credit-scoring-{}-{}", run.evaluation.model_name, run.timestamp)
    );
    let deployed = host.deployed.lock().unwrap();
    assert_eq!(deployed[0].0, "model-1");
    assert_eq!(deployed[0].1.name, format!("credit-scoring-deployment-{}", run.timestamp));
}

// ============================================================================
// DSM Pipeline
// ============================================================================

#[test]
fn test_dsm_pipeline_end_to_end() {
    let workdir = tempfile::tempdir().unwrap();
    let (updates, on_progress) = recorder();

    let run = DsmPipeline::builder()
        .config(test_config())
        .workdir(workdir.path())
        .on_progress(on_progress)
        .build()
        .unwrap()
        .run(&fixtures_path().join("dsm_dataset.csv"))
        .unwrap();

    let evaluation = &run.evaluation;
    assert_eq!(
        evaluation.labels,
        vec![
            "Generalized Anxiety Disorder",
            "Major Depressive Disorder",
            "Posttraumatic Stress Disorder",
        ]
    );

    // 10 rows per category: 7 train, 2 validation, 1 test
    assert_eq!(evaluation.confusion_matrix.len(), 3);
    assert!(evaluation.confusion_matrix.iter().all(|row| row.len() == 3));
    let total: usize = evaluation.confusion_matrix.iter().flatten().sum();
    assert_eq!(total, 3);
    for (i, row) in evaluation.confusion_matrix.iter().enumerate() {
        assert_eq!(row.iter().sum::<usize>(), 1, "row {i}");
    }

    assert_eq!(evaluation.language_distribution["en"], 12);
    assert_eq!(evaluation.language_distribution["sw"], 9);
    assert_eq!(evaluation.language_distribution["fr"], 9);
    assert_eq!(
        evaluation.cultural_adaptations["East African"],
        vec!["somatic_emphasis", "family_involvement", "spiritual_context"]
    );

    assert!(!evaluation.training_history.is_empty());
    assert!(evaluation.training_history.len() <= 15);
    assert!((0.0..=1.0).contains(&evaluation.overall_accuracy));
    assert_eq!(evaluation.macro_f1, evaluation.classification_report.macro_avg.f1_score);

    let sampled: usize = evaluation
        .cultural_bias_analysis
        .groups
        .values()
        .map(|g| g.sample_size)
        .sum();
    assert!(sampled <= 3);

    // Results and artifact
    let file_name = run.results_path.file_name().unwrap().to_string_lossy().to_string();
    assert_eq!(file_name, format!("evaluation_{}.json", run.timestamp));
    let reloaded: DsmEvaluation = read_report(&run.results_path).unwrap();
    assert_eq!(&reloaded, evaluation);

    assert!(run.artifact.dir.ends_with(format!("dsm-classifier-{}", run.timestamp)));
    let model_json: serde_json::Value = read_artifact_file(&run.artifact.dir, MODEL_FILE).unwrap();
    let model = TextClassifier::from_artifact(model_json).unwrap();
    assert_eq!(model.num_classes(), 3);

    assert_eq!(updates.lock().unwrap().last().unwrap().stage, TrainingStage::Complete);
}

#[test]
fn test_dsm_deployment_names() {
    let workdir = tempfile::tempdir().unwrap();
    let run = DsmPipeline::builder()
        .config(test_config())
        .workdir(workdir.path())
        .build()
        .unwrap()
        .run(&fixtures_path().join("dsm_dataset.csv"))
        .unwrap();

    let host = InMemoryHost::default();
    deploy_artifact(&host, &run.artifact.dir, &DeploymentKind::Dsm, &run.timestamp).unwrap();

    let stored = host.stored.lock().unwrap();
    assert_eq!(stored[0].1.name, format!("dsm-classifier-{}", run.timestamp));
    assert_eq!(
        stored[0].1.description,
        "DSM-5-TR Classification Model with Cultural Adaptations"
    );
}

#[test]
fn test_dsm_missing_columns_reported_together() {
    let workdir = tempfile::tempdir().unwrap();
    let path = workdir.path().join("partial.csv");
    std::fs::write(&path, "symptoms,dsm_category\nlow mood,Depressive\n").unwrap();

    let err = DsmPipeline::builder()
        .config(test_config())
        .workdir(workdir.path())
        .build()
        .unwrap()
        .run(&path)
        .unwrap_err();

    match err {
        TrainingError::MissingColumns(columns) => {
            assert_eq!(columns, vec!["dsm_code", "language", "cultural_context"])
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_dsm_dataset_from_json() {
    let workdir = tempfile::tempdir().unwrap();
    let path = workdir.path().join("dsm.json");
    let records = serde_json::json!([
        {"symptoms": " low mood ", "dsm_category": "Depressive", "dsm_code": "F32", "language": "en", "cultural_context": "European"},
        {"symptoms": "wasiwasi", "dsm_category": "Anxiety", "dsm_code": "F41", "language": "sw", "cultural_context": "East African"},
        {"symptoms": null, "dsm_category": "Anxiety", "dsm_code": "F41", "language": "fr", "cultural_context": null}
    ]);
    std::fs::write(&path, records.to_string()).unwrap();

    let loaded = load_dsm_dataset(&path).unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].symptoms, "low mood");
    assert_eq!(loaded[1].language.as_deref(), Some("sw"));
}
