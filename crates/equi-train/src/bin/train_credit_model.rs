//! CLI entry point for the credit scoring training pipeline.

use anyhow::{Result, anyhow};
use clap::Parser;
use dotenv::dotenv;
use equi_train::cli::{CommonArgs, init_logging};
use equi_train::deploy::{DeploymentKind, deploy_artifact};
use equi_train::{CreditPipeline, Domain, TrainingConfig, WatsonxClient};
use tracing::info;

/// Dataset file name under `data/training/fintech/`.
const DEFAULT_DATASET: &str = "credit_scoring_dataset.csv";

#[derive(Parser, Debug)]
#[command(
    author = "Equi Team",
    version,
    about = "Credit scoring model training with bias detection",
    long_about = "Trains credit default-risk classifiers, audits approval rates across \
                  age groups and income quartiles, and optionally deploys the best model \
                  to watsonx.ai.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  WATSONX_API_KEY       IBM Cloud API key (substituted into the config)\n  \
                  WATSONX_PROJECT_ID    watsonx.ai project id (substituted into the config)\n\n\
                  EXAMPLES:\n  \
                  # Train and decide interactively whether to deploy\n  \
                  train-credit-model\n\n  \
                  # Train on a custom dataset without deploying\n  \
                  train-credit-model --dataset applicants.csv --no-deploy\n\n  \
                  # Machine-readable evaluation\n  \
                  train-credit-model --no-deploy --json | jq .bias_analysis"
)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let common = &args.common;

    // Load environment variables before the config placeholders are substituted
    dotenv().ok();
    init_logging(&common.log_level, common.quiet, common.json);

    let config = TrainingConfig::from_file(&common.config)?;

    let dataset = common.dataset_path(Domain::Fintech, DEFAULT_DATASET);
    if !dataset.exists() {
        return Err(anyhow!(
            "Dataset not found: {}. Please ensure the credit scoring dataset is available",
            dataset.display()
        ));
    }

    // Fail on misconfigured credentials before spending time on training
    let client = match common.deploy_flag() {
        Some(false) => None,
        _ => Some(WatsonxClient::new(config.watsonx.clone())?),
    };

    info!("Credit Scoring Model Training Pipeline");
    let run = CreditPipeline::builder()
        .config(config)
        .workdir(&common.workdir)
        .build()?
        .run(&dataset)?;

    let evaluation = &run.evaluation;
    if common.json {
        println!("{}", serde_json::to_string_pretty(evaluation)?);
    } else {
        println!("Training complete!");
        println!("  Best model: {}", evaluation.model_name);
        println!("  Accuracy: {:.3}", evaluation.accuracy);
        if let Some(auc) = evaluation.auc_score {
            println!("  AUC: {:.3}", auc);
        }
        match evaluation.bias_analysis.demographic_parity_difference {
            Some(parity) => println!("  Demographic parity difference: {:.3}", parity),
            None => println!("  Demographic parity difference: N/A"),
        }
        println!("  Model saved at: {}", run.artifact.dir.display());
        println!("  Results saved at: {}", run.results_path.display());
    }

    if let Some(client) = client {
        if common.should_deploy()? {
            let kind = DeploymentKind::Credit {
                model_name: evaluation.model_name.clone(),
            };
            let ids = deploy_artifact(&client, &run.artifact.dir, &kind, &run.timestamp)?;
            if !common.json {
                println!("  Model UID: {}", ids.model_id);
                println!("  Deployment UID: {}", ids.deployment_id);
            }
        }
    }

    Ok(())
}
