//! Integration tests for the fairness audit.
//!
//! These tests run the audit over a scored fixture dataset and round-trip the
//! resulting reports through the JSON writer.

use equi_audit::metrics::{classification_report, roc_auc};
use equi_audit::{
    AccuracyAudit, Bucketing, CandidateScore, CreditEvaluation, Explanation, FairnessAudit,
    FairnessReport, ReportWriter, audit_accuracy_by_group, frame, read_report,
};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use pretty_assertions::assert_eq;
use std::path::PathBuf;

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_csv(filename: &str) -> DataFrame {
    let path = fixtures_path().join(filename);
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path))
        .expect("Failed to create CSV reader")
        .finish()
        .expect("Failed to read CSV file")
}

fn predictions(df: &DataFrame) -> (Vec<u32>, Vec<f64>) {
    let labels = frame::numeric_column(df, "prediction")
        .unwrap()
        .into_iter()
        .map(|v| v.unwrap() as u32)
        .collect();
    let probabilities = frame::numeric_column(df, "probability")
        .unwrap()
        .into_iter()
        .map(|v| v.unwrap())
        .collect();
    (labels, probabilities)
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

fn credit_audit(df: &DataFrame) -> FairnessReport {
    let (labels, probabilities) = predictions(df);
    let ages = frame::attribute_values(df, "age").unwrap();
    let incomes = frame::attribute_values(df, "income").unwrap();

    FairnessAudit::builder()
        .favorable_label(0u32)
        .attribute(
            "age",
            Bucketing::ranges(&[0.0, 30.0, 50.0, 100.0], &["young", "middle", "senior"])
                .assign("age", &ages)
                .unwrap(),
        )
        .attribute(
            "income",
            Bucketing::quantiles(&["Q1", "Q2", "Q3", "Q4"])
                .assign("income", &incomes)
                .unwrap(),
        )
        .build()
        .unwrap()
        .run(&labels, &probabilities)
        .unwrap()
}

// ============================================================================
// Audit Tests
// ============================================================================

#[test]
fn test_age_and_income_audit() {
    let report = credit_audit(&load_csv("scored_applicants.csv"));

    assert_eq!(
        report.groups.keys().cloned().collect::<Vec<_>>(),
        vec![
            "age_middle",
            "age_senior",
            "age_young",
            "income_Q1",
            "income_Q2",
            "income_Q3",
            "income_Q4"
        ]
    );
    assert_close(report.groups["age_young"].approval_rate, 1.0 / 3.0);
    assert_close(report.groups["age_middle"].approval_rate, 2.0 / 3.0);
    assert_close(report.groups["age_senior"].approval_rate, 1.0);
    assert_eq!(report.groups["income_Q4"].approval_rate, 0.0);
    assert_eq!(report.groups["income_Q1"].sample_size, 2);
    assert_close(report.groups["income_Q4"].avg_probability, 0.75);

    assert_close(report.attribute_parity["age"], 2.0 / 3.0);
    assert_close(report.attribute_parity["income"], 1.0);
    assert_close(report.demographic_parity_difference.unwrap(), 1.0);
}

#[test]
fn test_rates_are_bounded_and_sizes_match() {
    let report = credit_audit(&load_csv("scored_applicants.csv"));
    for stats in report.groups.values() {
        assert!((0.0..=1.0).contains(&stats.approval_rate));
        assert!(stats.sample_size > 0);
    }
    let age_total: usize = report
        .groups
        .iter()
        .filter(|(k, _)| k.starts_with("age_"))
        .map(|(_, s)| s.sample_size)
        .sum();
    assert_eq!(age_total, 8);
}

#[test]
fn test_missing_category_is_excluded() {
    let df = load_csv("scored_applicants.csv");
    let (labels, probabilities) = predictions(&df);
    let regions = Bucketing::Categorical
        .assign("region", &frame::attribute_values(&df, "region").unwrap())
        .unwrap();

    let report = FairnessAudit::builder()
        .favorable_label(0u32)
        .attribute("region", regions)
        .build()
        .unwrap()
        .run(&labels, &probabilities)
        .unwrap();

    assert_eq!(report.groups.len(), 2);
    assert_eq!(report.groups["region_north"].sample_size, 4);
    assert_eq!(report.groups["region_south"].sample_size, 3);
    assert_close(report.demographic_parity_difference.unwrap(), 2.0 / 3.0 - 0.5);
}

#[test]
fn test_accuracy_audit_by_region() {
    let df = load_csv("scored_applicants.csv");
    let (labels, _) = predictions(&df);
    let actual = vec![1u32, 0, 0, 1, 0, 0, 0, 1];
    let regions = frame::text_column(&df, "region").unwrap();

    let audit: AccuracyAudit = audit_accuracy_by_group(&labels, &actual, &regions).unwrap();
    assert_close(audit.groups["north"].accuracy, 1.0);
    assert_close(audit.groups["south"].accuracy, 2.0 / 3.0);
    assert_eq!(audit.groups["south"].prediction_distribution["1"], 1);
    assert_close(audit.accuracy_parity_difference.unwrap(), 1.0 / 3.0);
}

// ============================================================================
// Report Round-Trip Tests
// ============================================================================

#[test]
fn test_credit_evaluation_round_trip() {
    let df = load_csv("scored_applicants.csv");
    let (labels, probabilities) = predictions(&df);
    let actual = vec![1u32, 0, 0, 1, 0, 0, 0, 1];
    let is_positive: Vec<bool> = actual.iter().map(|a| *a == 1).collect();

    let evaluation = CreditEvaluation {
        model_name: "logistic_regression".to_string(),
        accuracy: equi_audit::metrics::accuracy(&labels, &actual).unwrap(),
        auc_score: roc_auc(&is_positive, &probabilities).unwrap(),
        classification_report: classification_report(&actual, &labels).unwrap(),
        bias_analysis: credit_audit(&df),
        explanations: Explanation {
            method: "linear_attribution".to_string(),
            feature_importance: vec![],
            sample_attributions: vec![vec![0.125, -0.5]],
            base_value: Some(-1.25),
        },
        model_comparison: vec![CandidateScore {
            model_name: "logistic_regression".to_string(),
            validation_auc: Some(0.8125),
        }],
        evaluation_timestamp: "2024-01-01T12:00:00".to_string(),
    };

    let dir = tempfile::tempdir().unwrap();
    let writer = ReportWriter::new(dir.path().join("results/fintech"), "credit_evaluation");
    let path = writer.write_at(&evaluation, "20240101_120000").unwrap();
    assert!(path.ends_with("credit_evaluation_20240101_120000.json"));

    let restored: CreditEvaluation = read_report(&path).unwrap();
    assert_eq!(restored, evaluation);
    assert_eq!(restored.accuracy, 0.75);
    assert_eq!(
        restored.bias_analysis.demographic_parity_difference,
        evaluation.bias_analysis.demographic_parity_difference
    );
}

#[test]
fn test_report_json_uses_flat_keys() {
    let dir = tempfile::tempdir().unwrap();
    let writer = ReportWriter::new(dir.path(), "audit");
    let path = writer
        .write(&credit_audit(&load_csv("scored_applicants.csv")))
        .unwrap();

    let value: serde_json::Value = read_report(&path).unwrap();
    assert!(value["groups"]["age_young"]["approval_rate"].is_number());
    assert!(value["demographic_parity_difference"].is_number());
}
