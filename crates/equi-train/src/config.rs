//! Configuration for the training pipelines.
//!
//! The JSON configuration file is parsed into [`TrainingConfig`], a typed
//! tree with named fields. `${VAR}` placeholders in the file are replaced
//! from the process environment before parsing; placeholders whose variable
//! is unset are kept verbatim so the deployment client can report them.
//!
//! # Example
//!
//! ```
//! use equi_train::TrainingConfig;
//!
//! let config = TrainingConfig::builder()
//!     .epochs(5)
//!     .batch_size(8)
//!     .favorable_label("0")
//!     .build()
//!     .expect("valid config");
//! assert_eq!(config.training.random_seed, 42);
//! ```

use crate::error::{Result, TrainingError};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default location of the configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/watsonx-training-config.json";

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Invalid regex: placeholder"));

/// Returns `true` if `value` still contains a `${VAR}` placeholder.
pub fn has_placeholder(value: &str) -> bool {
    PLACEHOLDER.is_match(value)
}

/// Replace `${VAR}` placeholders using `lookup`; unknown variables are kept.
///
/// Substituted values are JSON-escaped so quotes or backslashes in secrets
/// cannot break the surrounding document.
pub fn substitute_env(content: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    PLACEHOLDER
        .replace_all(content, |caps: &Captures| match lookup(&caps[1]) {
            Some(value) => {
                let quoted = serde_json::Value::String(value).to_string();
                quoted[1..quoted.len() - 1].to_string()
            }
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// API credentials for the model host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Credentials {
    pub url: String,
    pub apikey: String,
}

/// Connection settings for the managed model host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatsonxConfig {
    /// Base URL of the machine learning service.
    pub url: String,
    pub credentials: Credentials,
    pub project_id: String,
    /// Value of the `version` query parameter sent with every request.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// IAM token endpoint used to exchange the API key.
    #[serde(default = "default_iam_url")]
    pub iam_url: String,
}

fn default_api_version() -> String {
    "2023-05-29".to_string()
}

fn default_iam_url() -> String {
    "https://iam.cloud.ibm.com/identity/token".to_string()
}

impl Default for WatsonxConfig {
    fn default() -> Self {
        let url = "https://us-south.ml.cloud.ibm.com".to_string();
        Self {
            credentials: Credentials {
                url: url.clone(),
                apikey: "${WATSONX_API_KEY}".to_string(),
            },
            url,
            project_id: "${WATSONX_PROJECT_ID}".to_string(),
            api_version: default_api_version(),
            iam_url: default_iam_url(),
        }
    }
}

/// Hyperparameters of the credit scoring candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreditScoringParams {
    /// Gradient descent iterations for logistic regression.
    pub max_iter: usize,
    pub learning_rate: f64,
    /// L2 penalty strength.
    pub l2_strength: f64,
    /// Variance added to every Gaussian naive Bayes variance, relative to the
    /// largest feature variance.
    pub var_smoothing: f64,
}

impl Default for CreditScoringParams {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            learning_rate: 0.1,
            l2_strength: 0.01,
            var_smoothing: 1e-9,
        }
    }
}

/// Settings of the DSM text classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DsmClassificationParams {
    /// Name recorded in artifact metadata.
    pub base_model: String,
    /// Tokens kept per document.
    pub max_length: usize,
    /// Most frequent training tokens kept in the vocabulary.
    pub vocabulary_size: usize,
}

impl Default for DsmClassificationParams {
    fn default() -> Self {
        Self {
            base_model: "bag-of-words-softmax".to_string(),
            max_length: 512,
            vocabulary_size: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FintechModels {
    pub credit_scoring: CreditScoringParams,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MentalHealthModels {
    pub dsm_classification: DsmClassificationParams,
}

/// Per-domain model settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelsConfig {
    pub fintech: FintechModels,
    pub mental_health: MentalHealthModels,
}

/// Shared training loop and split settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingParams {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Epochs without evaluation-loss improvement before stopping.
    pub early_stopping_patience: usize,
    pub random_seed: u64,
    /// Fraction held out from training (validation + test).
    pub test_size: f64,
    /// Fraction of the held-out rows used for validation; the rest is test.
    pub validation_fraction: f64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            epochs: 20,
            batch_size: 16,
            learning_rate: 0.5,
            early_stopping_patience: 3,
            random_seed: 42,
            test_size: 0.3,
            validation_fraction: 0.5,
        }
    }
}

/// Fairness audit and explanation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditSettings {
    /// Label value counted as approval (the credit label `0` = no default).
    pub favorable_label: String,
    /// Maximum test rows used for explanations.
    pub explanation_samples: usize,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            favorable_label: "0".to_string(),
            explanation_samples: 100,
        }
    }
}

/// Complete configuration of a training run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingConfig {
    pub watsonx: WatsonxConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub training: TrainingParams,
    #[serde(default)]
    pub audit: AuditSettings,
}

impl TrainingConfig {
    /// Create a new builder starting from the defaults.
    #[must_use]
    pub fn builder() -> TrainingConfigBuilder {
        TrainingConfigBuilder::default()
    }

    /// Load, substitute environment placeholders, parse and validate.
    ///
    /// # Errors
    ///
    /// - [`TrainingError::Io`] if the file cannot be read
    /// - [`TrainingError::InvalidConfig`] on malformed JSON, unknown keys or
    ///   out-of-range values
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let substituted = substitute_env(&content, |name| std::env::var(name).ok());
        let config = Self::from_json(&substituted)
            .map_err(|e| TrainingError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate an already substituted JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| TrainingError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every numeric range and required string.
    pub fn validate(&self) -> Result<()> {
        fn invalid(message: &str) -> Result<()> {
            Err(TrainingError::InvalidConfig(message.to_string()))
        }

        let t = &self.training;
        if t.test_size <= 0.0 || t.test_size >= 1.0 {
            return invalid("training.test_size must be between 0.0 and 1.0 (exclusive)");
        }
        if t.validation_fraction <= 0.0 || t.validation_fraction >= 1.0 {
            return invalid("training.validation_fraction must be between 0.0 and 1.0 (exclusive)");
        }
        if t.epochs == 0 {
            return invalid("training.epochs must be at least 1");
        }
        if t.batch_size == 0 {
            return invalid("training.batch_size must be at least 1");
        }
        if !(t.learning_rate > 0.0) {
            return invalid("training.learning_rate must be positive");
        }
        if t.early_stopping_patience == 0 {
            return invalid("training.early_stopping_patience must be at least 1");
        }

        let credit = &self.models.fintech.credit_scoring;
        if credit.max_iter == 0 {
            return invalid("models.fintech.credit_scoring.max_iter must be at least 1");
        }
        if !(credit.learning_rate > 0.0) {
            return invalid("models.fintech.credit_scoring.learning_rate must be positive");
        }
        if credit.l2_strength < 0.0 || credit.var_smoothing < 0.0 {
            return invalid("models.fintech.credit_scoring regularization must not be negative");
        }

        let dsm = &self.models.mental_health.dsm_classification;
        if dsm.max_length == 0 {
            return invalid("models.mental_health.dsm_classification.max_length must be at least 1");
        }
        if dsm.vocabulary_size == 0 {
            return invalid("models.mental_health.dsm_classification.vocabulary_size must be at least 1");
        }

        if self.audit.favorable_label.trim().is_empty() {
            return invalid("audit.favorable_label must not be empty");
        }
        if self.audit.explanation_samples == 0 {
            return invalid("audit.explanation_samples must be at least 1");
        }
        if self.watsonx.url.trim().is_empty() {
            return invalid("watsonx.url must not be empty");
        }

        debug!("Configuration validated");
        Ok(())
    }
}

/// Builder for [`TrainingConfig`].
#[derive(Debug, Clone, Default)]
pub struct TrainingConfigBuilder {
    config: TrainingConfig,
}

impl TrainingConfigBuilder {
    /// Replace the model host connection settings.
    #[must_use]
    pub fn watsonx(mut self, watsonx: WatsonxConfig) -> Self {
        self.config.watsonx = watsonx;
        self
    }

    #[must_use]
    pub fn epochs(mut self, epochs: usize) -> Self {
        self.config.training.epochs = epochs;
        self
    }

    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.training.batch_size = batch_size;
        self
    }

    /// Learning rate of the text classifier.
    #[must_use]
    pub fn learning_rate(mut self, learning_rate: f64) -> Self {
        self.config.training.learning_rate = learning_rate;
        self
    }

    #[must_use]
    pub fn early_stopping_patience(mut self, patience: usize) -> Self {
        self.config.training.early_stopping_patience = patience;
        self
    }

    /// Set the random seed for reproducibility (default: 42).
    #[must_use]
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.config.training.random_seed = seed;
        self
    }

    /// Fraction held out for validation + test (default: 0.3).
    #[must_use]
    pub fn test_size(mut self, size: f64) -> Self {
        self.config.training.test_size = size;
        self
    }

    #[must_use]
    pub fn validation_fraction(mut self, fraction: f64) -> Self {
        self.config.training.validation_fraction = fraction;
        self
    }

    #[must_use]
    pub fn credit_scoring(mut self, params: CreditScoringParams) -> Self {
        self.config.models.fintech.credit_scoring = params;
        self
    }

    #[must_use]
    pub fn dsm_classification(mut self, params: DsmClassificationParams) -> Self {
        self.config.models.mental_health.dsm_classification = params;
        self
    }

    /// Label value counted as approval by the credit fairness audit.
    #[must_use]
    pub fn favorable_label(mut self, label: impl Into<String>) -> Self {
        self.config.audit.favorable_label = label.into();
        self
    }

    #[must_use]
    pub fn explanation_samples(mut self, samples: usize) -> Self {
        self.config.audit.explanation_samples = samples;
        self
    }

    /// Build the configuration, validating all settings.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::InvalidConfig`] for out-of-range values.
    pub fn build(self) -> Result<TrainingConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Training domain; selects directory names and required columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Fintech,
    MentalHealth,
}

impl Domain {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Fintech => "fintech",
            Domain::MentalHealth => "mental-health",
        }
    }
}

/// Directory layout of a run, rooted at the working directory.
///
/// ```text
/// <root>/data/training/<domain>
/// <root>/models/<domain>
/// <root>/logs/training
/// <root>/results/<domain>
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct WorkDirs {
    root: PathBuf,
    domain: Domain,
}

impl WorkDirs {
    pub fn new(root: impl Into<PathBuf>, domain: Domain) -> Self {
        Self {
            root: root.into(),
            domain,
        }
    }

    pub fn data(&self) -> PathBuf {
        self.root.join("data/training").join(self.domain.as_str())
    }

    pub fn models(&self) -> PathBuf {
        self.root.join("models").join(self.domain.as_str())
    }

    pub fn logs(&self) -> PathBuf {
        self.root.join("logs/training")
    }

    pub fn results(&self) -> PathBuf {
        self.root.join("results").join(self.domain.as_str())
    }

    /// Create every directory of the layout.
    pub fn create(&self) -> Result<()> {
        for dir in [self.data(), self.models(), self.logs(), self.results()] {
            fs::create_dir_all(&dir)?;
            debug!("Ensured directory {}", dir.display());
        }
        Ok(())
    }
}
