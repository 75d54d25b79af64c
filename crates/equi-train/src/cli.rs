//! Shared command-line plumbing for the training binaries.

use crate::config::{DEFAULT_CONFIG_PATH, Domain, WorkDirs};
use crate::error::Result;
use clap::Args;
use inquire::Confirm;
use std::path::PathBuf;

/// Options common to `train-credit-model` and `train-dsm-model`.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct CommonArgs {
    /// Path to the JSON training configuration
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Dataset to train on
    ///
    /// Defaults to the domain dataset under <WORKDIR>/data/training/
    #[arg(short, long)]
    pub dataset: Option<PathBuf>,

    /// Root of the data/, models/, logs/ and results/ directories
    #[arg(short, long, default_value = ".")]
    pub workdir: PathBuf,

    /// Deploy the trained model without asking
    #[arg(long, conflicts_with = "no_deploy")]
    pub deploy: bool,

    /// Skip deployment without asking
    #[arg(long)]
    pub no_deploy: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Suppress progress output (only show warnings and errors)
    #[arg(short, long)]
    pub quiet: bool,

    /// Print the evaluation as JSON to stdout instead of a summary
    ///
    /// Disables all logging so stdout only carries the JSON document.
    #[arg(long)]
    pub json: bool,
}

impl CommonArgs {
    /// Dataset path, falling back to `<workdir>/data/training/<domain>/<default_file>`.
    pub fn dataset_path(&self, domain: Domain, default_file: &str) -> PathBuf {
        self.dataset
            .clone()
            .unwrap_or_else(|| WorkDirs::new(&self.workdir, domain).data().join(default_file))
    }

    /// `Some` when the deployment decision was made on the command line.
    pub fn deploy_flag(&self) -> Option<bool> {
        if self.deploy {
            Some(true)
        } else if self.no_deploy {
            Some(false)
        } else {
            None
        }
    }

    /// Resolve the deployment decision, prompting when no flag was given.
    pub fn should_deploy(&self) -> Result<bool> {
        match self.deploy_flag() {
            Some(decision) => Ok(decision),
            None => confirm_deploy(),
        }
    }
}

/// Ask whether to deploy to watsonx.ai; defaults to no.
pub fn confirm_deploy() -> Result<bool> {
    Ok(Confirm::new("Deploy model to watsonx.ai?")
        .with_default(false)
        .prompt()?)
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
pub fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
