//! Model artifact directories.
//!
//! Each training run writes one timestamped directory under the models
//! directory:
//!
//! ```text
//! models/fintech/credit_model_20250101_120000/
//!     model.json
//!     scaler.json          (credit, when the best model is scaled)
//!     feature_names.json   (credit)
//!     label_encoder.json
//!     metadata.json
//! ```
//!
//! The directory is what [`crate::deploy`] uploads to the model host.

use crate::error::{Result, TrainingError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const MODEL_FILE: &str = "model.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const FEATURE_NAMES_FILE: &str = "feature_names.json";
pub const LABEL_ENCODER_FILE: &str = "label_encoder.json";
pub const METADATA_FILE: &str = "metadata.json";

/// Summary written as `metadata.json` next to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub model_name: String,
    /// `fintech` or `mental-health`.
    pub domain: String,
    pub created_at: String,
    /// Headline metrics, e.g. `accuracy`, `auc_score`, `macro_f1`.
    pub metrics: serde_json::Map<String, serde_json::Value>,
    /// Files of the artifact directory, in write order.
    pub files: Vec<String>,
}

/// A finished artifact directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    pub dir: PathBuf,
    pub metadata: ArtifactMetadata,
}

/// Incrementally writes the files of one artifact directory.
#[derive(Debug)]
pub struct ArtifactWriter {
    dir: PathBuf,
    files: Vec<String>,
}

impl ArtifactWriter {
    /// Create `<models_dir>/<dir_name>`.
    ///
    /// An existing directory of the same name is replaced, so a rerun within
    /// the same second leaves no stale files from the earlier run.
    pub fn create(models_dir: &Path, dir_name: &str) -> Result<Self> {
        let dir = models_dir.join(dir_name);
        if dir.exists() {
            warn!("Replacing existing artifact directory {}", dir.display());
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        debug!("Created artifact directory {}", dir.display());
        Ok(Self {
            dir,
            files: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Serialize `value` as pretty JSON into `file_name`.
    pub fn write_json<T: Serialize + ?Sized>(&mut self, file_name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(file_name);
        fs::write(&path, serde_json::to_string_pretty(value)?)?;
        self.files.push(file_name.to_string());
        Ok(())
    }

    /// Write `metadata.json` and close the artifact.
    pub fn finish(
        mut self,
        model_name: &str,
        domain: &str,
        created_at: &str,
        metrics: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ModelArtifact> {
        self.files.push(METADATA_FILE.to_string());
        let metadata = ArtifactMetadata {
            model_name: model_name.to_string(),
            domain: domain.to_string(),
            created_at: created_at.to_string(),
            metrics,
            files: self.files,
        };
        fs::write(
            self.dir.join(METADATA_FILE),
            serde_json::to_string_pretty(&metadata)?,
        )?;
        info!("Model saved to {}", self.dir.display());
        Ok(ModelArtifact {
            dir: self.dir,
            metadata,
        })
    }
}

/// Read one JSON file of an artifact directory.
pub fn read_artifact_file<T: DeserializeOwned>(dir: &Path, file_name: &str) -> Result<T> {
    let path = dir.join(file_name);
    let content = fs::read_to_string(&path).map_err(|e| {
        TrainingError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Read `metadata.json` of an artifact directory.
pub fn read_metadata(dir: &Path) -> Result<ArtifactMetadata> {
    read_artifact_file(dir, METADATA_FILE)
}
