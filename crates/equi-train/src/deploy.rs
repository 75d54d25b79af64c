//! Remote model storage and online deployment.
//!
//! [`ModelHost`] is the seam between the pipelines and the hosting service;
//! [`WatsonxClient`] implements it against the watsonx.ai machine learning
//! REST API using a blocking `reqwest` client.

use crate::artifacts;
use crate::config::{WatsonxConfig, has_placeholder};
use crate::error::{Result, TrainingError};
use once_cell::sync::OnceCell;
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use static_assertions::{assert_impl_all, assert_obj_safe};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Request timeout for every call to the model host.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

const IAM_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

/// Describes a stored model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelMetadata {
    pub name: String,
    pub description: String,
    pub model_type: String,
    pub software_spec: String,
}

/// Describes an online deployment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentMetadata {
    pub name: String,
    pub description: String,
}

/// Stores model artifacts and exposes them as online deployments.
pub trait ModelHost {
    /// Upload the artifact directory; returns the stored model id.
    fn store_model(&self, artifact_dir: &Path, metadata: &ModelMetadata) -> Result<String>;

    /// Create an online deployment of a stored model; returns its id.
    fn create_online_deployment(&self, model_id: &str, metadata: &DeploymentMetadata) -> Result<String>;
}

assert_obj_safe!(ModelHost);

/// Which pipeline produced the artifact being deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentKind {
    Credit { model_name: String },
    Dsm,
}

/// Ids returned by a successful deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentIds {
    pub model_id: String,
    pub deployment_id: String,
}

/// Names and descriptions for a deployment made at `timestamp`.
pub fn deployment_metadata(kind: &DeploymentKind, timestamp: &str) -> (ModelMetadata, DeploymentMetadata) {
    let (name, description, deployment_name, deployment_description) = match kind {
        DeploymentKind::Credit { model_name } => (
            format!("credit-scoring-{}-{}", model_name, timestamp),
            format!("Credit Scoring Model ({}) with Bias Detection", model_name),
            format!("credit-scoring-deployment-{}", timestamp),
            "Credit Scoring Model Deployment".to_string(),
        ),
        DeploymentKind::Dsm => (
            format!("dsm-classifier-{}", timestamp),
            "DSM-5-TR Classification Model with Cultural Adaptations".to_string(),
            format!("dsm-classifier-deployment-{}", timestamp),
            "DSM-5-TR Classifier Deployment".to_string(),
        ),
    };
    (
        ModelMetadata {
            name,
            description,
            model_type: "scikit-learn_1.0".to_string(),
            software_spec: "default_py3.9".to_string(),
        },
        DeploymentMetadata {
            name: deployment_name,
            description: deployment_description,
        },
    )
}

/// Store `artifact_dir` on `host` and deploy it online.
pub fn deploy_artifact(
    host: &dyn ModelHost,
    artifact_dir: &Path,
    kind: &DeploymentKind,
    timestamp: &str,
) -> Result<DeploymentIds> {
    info!("Deploying model to watsonx.ai...");
    let (model_meta, deployment_meta) = deployment_metadata(kind, timestamp);

    let model_id = host.store_model(artifact_dir, &model_meta)?;
    info!("Model stored with ID: {}", model_id);

    let deployment_id = host.create_online_deployment(&model_id, &deployment_meta)?;
    info!("Model deployed with ID: {}", deployment_id);

    Ok(DeploymentIds {
        model_id,
        deployment_id,
    })
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ResourceResponse {
    metadata: ResourceMetadata,
}

#[derive(Debug, Deserialize)]
struct ResourceMetadata {
    id: String,
}

/// watsonx.ai machine learning client.
///
/// The IAM bearer token is requested on first use and reused for the
/// lifetime of the client.
pub struct WatsonxClient {
    config: WatsonxConfig,
    client: Client,
    token: OnceCell<String>,
}

assert_impl_all!(WatsonxClient: Send, Sync);

impl std::fmt::Debug for WatsonxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatsonxClient")
            .field("url", &self.config.url)
            .field("project_id", &self.config.project_id)
            .field("token", &self.token.get().map(|_| "<token>"))
            .finish()
    }
}

impl WatsonxClient {
    /// Create a client, failing on empty or unsubstituted credentials.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::InvalidConfig`] if the URL, API key or
    /// project id is empty or still holds a `${VAR}` placeholder.
    pub fn new(config: WatsonxConfig) -> Result<Self> {
        let fields = [
            ("url", &config.url),
            ("credentials.apikey", &config.credentials.apikey),
            ("project_id", &config.project_id),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(TrainingError::InvalidConfig(format!(
                    "watsonx.{} is empty",
                    field
                )));
            }
            if has_placeholder(value) {
                return Err(TrainingError::InvalidConfig(format!(
                    "watsonx.{} still contains a placeholder ({}); set the environment variable",
                    field, value
                )));
            }
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        info!("watsonx.ai client initialized for {}", config.url);
        Ok(Self {
            config,
            client,
            token: OnceCell::new(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/ml/v4/{}?version={}",
            self.config.url.trim_end_matches('/'),
            path,
            self.config.api_version
        )
    }

    fn token(&self) -> Result<&str> {
        let token = self.token.get_or_try_init(|| {
            debug!("Requesting IAM token");
            let response = self
                .client
                .post(&self.config.iam_url)
                .form(&[
                    ("grant_type", IAM_GRANT_TYPE),
                    ("apikey", self.config.credentials.apikey.as_str()),
                ])
                .send()?;
            let token: TokenResponse = check_status("IAM token", response)?.json()?;
            Ok::<_, TrainingError>(token.access_token)
        })?;
        Ok(token)
    }

    /// Collect every JSON file of the artifact into one upload document.
    fn artifact_bundle(artifact_dir: &Path) -> Result<serde_json::Value> {
        let metadata = artifacts::read_metadata(artifact_dir)?;
        let mut files = serde_json::Map::new();
        for file in &metadata.files {
            let content = fs::read_to_string(artifact_dir.join(file))?;
            files.insert(file.clone(), serde_json::from_str(&content)?);
        }
        Ok(json!({ "files": files }))
    }
}

fn check_status(action: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text()?;
    Err(TrainingError::DeploymentFailed(format!(
        "{} request failed with {}: {}",
        action, status, body
    )))
}

impl ModelHost for WatsonxClient {
    fn store_model(&self, artifact_dir: &Path, metadata: &ModelMetadata) -> Result<String> {
        let token = self.token()?;
        let bundle = Self::artifact_bundle(artifact_dir)?;

        let response = self
            .client
            .post(self.endpoint("models"))
            .bearer_auth(token)
            .json(&json!({
                "name": metadata.name,
                "description": metadata.description,
                "type": metadata.model_type,
                "software_spec": { "name": metadata.software_spec },
                "project_id": self.config.project_id,
            }))
            .send()?;
        let model: ResourceResponse = check_status("store model", response)?.json()?;
        let model_id = model.metadata.id;

        let response = self
            .client
            .put(self.endpoint(&format!("models/{}/content", model_id)))
            .query(&[("project_id", self.config.project_id.as_str())])
            .bearer_auth(token)
            .json(&bundle)
            .send()?;
        check_status("upload model content", response)?;
        debug!("Uploaded artifact {} as model {}", artifact_dir.display(), model_id);

        Ok(model_id)
    }

    fn create_online_deployment(&self, model_id: &str, metadata: &DeploymentMetadata) -> Result<String> {
        let token = self.token()?;
        let response = self
            .client
            .post(self.endpoint("deployments"))
            .bearer_auth(token)
            .json(&json!({
                "name": metadata.name,
                "description": metadata.description,
                "online": {},
                "asset": { "id": model_id },
                "project_id": self.config.project_id,
            }))
            .send()?;
        let deployment: ResourceResponse = check_status("create deployment", response)?.json()?;
        Ok(deployment.metadata.id)
    }
}
