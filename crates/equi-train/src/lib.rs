//! equi-train: fairness-audited training pipelines.
//!
//! This crate trains two kinds of models and pushes them to a managed model
//! host:
//!
//! - **Credit scoring**: binary default-risk classifiers on tabular applicant
//!   data, audited for demographic parity across age groups and income
//!   quartiles
//! - **DSM-5-TR classification**: a bag-of-words text classifier over symptom
//!   descriptions, audited for accuracy across cultural contexts
//!
//! # Features
//!
//! - **Typed configuration**: JSON config with `${VAR}` environment substitution
//! - **Dataset validation**: required columns, supported formats, cleaning
//! - **Model selection**: candidates compared on validation AUC
//! - **Bias audit**: group-wise rates via [`equi_audit`]
//! - **Explainability**: linear attributions or permutation importance
//! - **Artifacts**: timestamped model directories and result files
//! - **Deployment**: watsonx.ai model storage and online deployments
//! - **Progress Reporting**: stage callbacks for CLIs and UIs
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use equi_train::{CreditPipeline, TrainingConfig, WatsonxClient, deploy::{DeploymentKind, deploy_artifact}};
//!
//! let config = TrainingConfig::from_file("config/watsonx-training-config.json")?;
//! let client = WatsonxClient::new(config.watsonx.clone())?;
//!
//! let run = CreditPipeline::builder()
//!     .config(config)
//!     .on_progress(|u| println!("{:.0}% - {}", u.progress * 100.0, u.message))
//!     .build()?
//!     .run("data/training/fintech/credit_scoring_dataset.csv".as_ref())?;
//!
//! let kind = DeploymentKind::Credit { model_name: run.evaluation.model_name.clone() };
//! let ids = deploy_artifact(&client, &run.artifact.dir, &kind, &run.timestamp)?;
//! println!("Deployment: {}", ids.deployment_id);
//! ```
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, TrainingError>`](TrainingError).
//! Each variant has a stable [`error_code()`](TrainingError::error_code).

pub mod artifacts;
pub mod cli;
pub mod config;
pub mod credit;
pub mod dataset;
pub mod deploy;
pub mod dsm;
pub mod error;
pub mod estimator;
pub mod explain;
pub mod features;
pub mod progress;
pub mod split;
pub mod text;

// Re-exports for convenient access
pub use artifacts::{ArtifactMetadata, ArtifactWriter, ModelArtifact, read_metadata};
pub use config::{Domain, TrainingConfig, TrainingConfigBuilder, WatsonxConfig, WorkDirs};
pub use credit::{CreditPipeline, CreditPipelineBuilder, CreditRun};
pub use dataset::{CreditRecord, DsmRecord, load_credit_dataset, load_dsm_dataset};
pub use deploy::{DeploymentIds, DeploymentKind, ModelHost, WatsonxClient, deploy_artifact};
pub use dsm::{DsmPipeline, DsmPipelineBuilder, DsmRun};
pub use error::{Result, TrainingError};
pub use estimator::{Classifier, GaussianNaiveBayes, LogisticRegression};
pub use progress::{ProgressCallback, ProgressUpdate, TrainingStage};
pub use text::TextClassifier;
