//! CLI entry point for the DSM-5-TR classification training pipeline.

use anyhow::{Result, anyhow};
use clap::Parser;
use dotenv::dotenv;
use equi_train::cli::{CommonArgs, init_logging};
use equi_train::deploy::{DeploymentKind, deploy_artifact};
use equi_train::{Domain, DsmPipeline, TrainingConfig, WatsonxClient};
use tracing::info;

/// Dataset file name under `data/training/mental-health/`.
const DEFAULT_DATASET: &str = "dsm-5-tr-dataset.csv";

#[derive(Parser, Debug)]
#[command(
    author = "Equi Team",
    version,
    about = "DSM-5-TR classification model training with cultural adaptations",
    long_about = "Trains a multilingual symptom classifier over DSM-5-TR categories, \
                  reports accuracy per cultural context, and optionally deploys the model \
                  to watsonx.ai.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  WATSONX_API_KEY       IBM Cloud API key (substituted into the config)\n  \
                  WATSONX_PROJECT_ID    watsonx.ai project id (substituted into the config)\n\n\
                  EXAMPLES:\n  \
                  # Train with the default dataset\n  \
                  train-dsm-model\n\n  \
                  # JSON dataset, deploy without prompting\n  \
                  train-dsm-model --dataset dsm.json --deploy"
)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let common = &args.common;

    dotenv().ok();
    init_logging(&common.log_level, common.quiet, common.json);

    let config = TrainingConfig::from_file(&common.config)?;

    let dataset = common.dataset_path(Domain::MentalHealth, DEFAULT_DATASET);
    if !dataset.exists() {
        return Err(anyhow!(
            "Dataset not found: {}. Please ensure the DSM dataset is available",
            dataset.display()
        ));
    }

    let client = match common.deploy_flag() {
        Some(false) => None,
        _ => Some(WatsonxClient::new(config.watsonx.clone())?),
    };

    info!("DSM-5-TR Model Training Pipeline");
    let run = DsmPipeline::builder()
        .config(config)
        .workdir(&common.workdir)
        .build()?
        .run(&dataset)?;

    let evaluation = &run.evaluation;
    if common.json {
        println!("{}", serde_json::to_string_pretty(evaluation)?);
    } else {
        println!("Training complete!");
        println!("  Model saved at: {}", run.artifact.dir.display());
        println!("  Accuracy: {:.3}", evaluation.overall_accuracy);
        println!("  Macro F1: {:.3}", evaluation.macro_f1);
        for (culture, stats) in &evaluation.cultural_bias_analysis.groups {
            println!("  {}: accuracy {:.3} ({} samples)", culture, stats.accuracy, stats.sample_size);
        }
        println!("  Results saved at: {}", run.results_path.display());
    }

    if let Some(client) = client {
        if common.should_deploy()? {
            let ids = deploy_artifact(&client, &run.artifact.dir, &DeploymentKind::Dsm, &run.timestamp)?;
            if !common.json {
                println!("  Deployment UID: {}", ids.deployment_id);
            }
        }
    }

    Ok(())
}
