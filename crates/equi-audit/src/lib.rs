//! Fairness Audit Library
//!
//! Group-wise fairness auditing and evaluation reporting for classifier
//! predictions.
//!
//! # Overview
//!
//! - **Bucketing**: protected attributes as literal categories, fixed ranges or quantile bins
//! - **Fairness audit**: per-group approval rate, sample size and mean probability,
//!   reduced to the demographic parity difference
//! - **Accuracy audit**: per-group accuracy for multi-class models
//! - **Metrics**: accuracy, ROC AUC, classification report, confusion matrix
//! - **Reports**: typed evaluation results written as timestamped JSON
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use equi_audit::{Bucketing, FairnessAudit, frame};
//!
//! let ages = frame::attribute_values(&test_df, "age")?;
//! let incomes = frame::attribute_values(&test_df, "income")?;
//!
//! let report = FairnessAudit::builder()
//!     .favorable_label(0u32)
//!     .attribute("age", Bucketing::ranges(&[0.0, 30.0, 50.0, 100.0], &["young", "middle", "senior"]).assign("age", &ages)?)
//!     .attribute("income", Bucketing::quantiles(&["Q1", "Q2", "Q3", "Q4"]).assign("income", &incomes)?)
//!     .build()?
//!     .run(&predictions, &probabilities)?;
//!
//! println!("Demographic parity difference: {:?}", report.demographic_parity_difference);
//! ```

pub mod audit;
pub mod binning;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod report;

// Re-exports for convenient access
pub use audit::{
    AccuracyAudit, AccuracyGroupStats, AttributeAudit, FairnessAudit, FairnessAuditBuilder,
    FairnessReport, GroupStats, audit_accuracy_by_group, audit_attribute, parity_difference,
};
pub use binning::{AttributeValue, Bucketing};
pub use error::{AuditError, Result as AuditResult, ResultExt};
pub use metrics::{ClassMetrics, ClassificationReport};
pub use report::{
    CandidateScore, CreditEvaluation, DsmEvaluation, EpochLog, Explanation, FeatureImportance,
    ReportWriter, read_report, run_timestamp,
};
