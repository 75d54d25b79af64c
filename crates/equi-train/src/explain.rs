//! Feature attributions for fitted credit models.

use crate::error::{Result, TrainingError};
use crate::estimator::Classifier;
use equi_audit::metrics::{accuracy, roc_auc};
use equi_audit::{Explanation, FeatureImportance};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{info, warn};

/// Attribution rows kept in the explanation.
pub const SAMPLE_ATTRIBUTIONS: usize = 10;

pub const LINEAR_ATTRIBUTION: &str = "linear_attribution";
pub const PERMUTATION_IMPORTANCE: &str = "permutation_importance";

/// Explain `model` on the rows `x` (already in the model's input space).
///
/// Linear models get exact additive attributions against the column means
/// of `x`; any other model gets seeded permutation importance measured on
/// `y`. At most `max_samples` rows are explained.
pub fn explain(
    model: &dyn Classifier,
    x: &[Vec<f64>],
    y: &[usize],
    feature_names: &[String],
    max_samples: usize,
    seed: u64,
) -> Result<Explanation> {
    info!("Generating explanations...");
    if x.is_empty() {
        return Err(TrainingError::InvalidData(
            "cannot explain a model on zero rows".to_string(),
        ));
    }
    if x.len() != y.len() {
        return Err(TrainingError::InvalidData(format!(
            "explanation rows ({}) and labels ({}) differ in length",
            x.len(),
            y.len()
        )));
    }
    if let Some(row) = x.iter().find(|r| r.len() != feature_names.len()) {
        return Err(TrainingError::InvalidData(format!(
            "expected {} features, got {}",
            feature_names.len(),
            row.len()
        )));
    }

    let n = max_samples.clamp(1, x.len());
    let explanation = match model.linear_coefficients() {
        Some((weights, intercept)) => {
            linear_attribution(weights, intercept, x, &x[..n], feature_names)
        }
        None => permutation_importance(model, &x[..n], &y[..n], feature_names, seed)?,
    };

    for (i, feature) in explanation.feature_importance.iter().take(3).enumerate() {
        info!("  {}. {}: {:.4}", i + 1, feature.feature, feature.importance);
    }
    Ok(explanation)
}

fn column_means(x: &[Vec<f64>]) -> Vec<f64> {
    let n = x.len() as f64;
    let mut means = vec![0.0; x[0].len()];
    for row in x {
        for (m, v) in means.iter_mut().zip(row) {
            *m += v / n;
        }
    }
    means
}

fn sorted_importance(feature_names: &[String], scores: Vec<f64>) -> Vec<FeatureImportance> {
    let mut importance: Vec<FeatureImportance> = feature_names
        .iter()
        .zip(scores)
        .map(|(feature, importance)| FeatureImportance {
            feature: feature.clone(),
            importance,
        })
        .collect();
    importance.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    importance
}

/// `phi_ij = w_j (x_ij - mean_j)`; importance is the mean `|phi_ij|`.
fn linear_attribution(
    weights: &[f64],
    intercept: f64,
    background: &[Vec<f64>],
    rows: &[Vec<f64>],
    feature_names: &[String],
) -> Explanation {
    let means = column_means(background);
    let attributions: Vec<Vec<f64>> = rows
        .iter()
        .map(|row| {
            row.iter()
                .zip(weights.iter().zip(&means))
                .map(|(v, (w, m))| w * (v - m))
                .collect()
        })
        .collect();

    let n = attributions.len() as f64;
    let mut scores = vec![0.0; weights.len()];
    for row in &attributions {
        for (s, phi) in scores.iter_mut().zip(row) {
            *s += phi.abs() / n;
        }
    }

    let base_value = intercept + weights.iter().zip(&means).map(|(w, m)| w * m).sum::<f64>();
    Explanation {
        method: LINEAR_ATTRIBUTION.to_string(),
        feature_importance: sorted_importance(feature_names, scores),
        sample_attributions: attributions.into_iter().take(SAMPLE_ATTRIBUTIONS).collect(),
        base_value: Some(base_value),
    }
}

/// Score drop when one column is shuffled. AUC when defined, accuracy otherwise.
fn permutation_importance(
    model: &dyn Classifier,
    x: &[Vec<f64>],
    y: &[usize],
    feature_names: &[String],
    seed: u64,
) -> Result<Explanation> {
    let positives: Vec<bool> = y.iter().map(|&label| label == 1).collect();
    let score = |rows: &[Vec<f64>]| -> Result<f64> {
        let proba = model.predict_proba(rows)?;
        match roc_auc(&positives, &proba)? {
            Some(auc) => Ok(auc),
            None => {
                let predicted: Vec<usize> = proba.iter().map(|&p| usize::from(p >= 0.5)).collect();
                Ok(accuracy(&predicted, y)?)
            }
        }
    };

    let proba = model.predict_proba(x)?;
    if roc_auc(&positives, &proba)?.is_none() {
        warn!("Only one class among explained rows; permutation importance uses accuracy");
    }
    let baseline = score(x)?;
    let base_value = proba.iter().sum::<f64>() / proba.len() as f64;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut scores = Vec::with_capacity(feature_names.len());
    for j in 0..feature_names.len() {
        let mut column: Vec<f64> = x.iter().map(|row| row[j]).collect();
        column.shuffle(&mut rng);
        let permuted: Vec<Vec<f64>> = x
            .iter()
            .zip(&column)
            .map(|(row, &v)| {
                let mut row = row.clone();
                row[j] = v;
                row
            })
            .collect();
        scores.push(baseline - score(&permuted)?);
    }

    Ok(Explanation {
        method: PERMUTATION_IMPORTANCE.to_string(),
        feature_importance: sorted_importance(feature_names, scores),
        sample_attributions: Vec::new(),
        base_value: Some(base_value),
    })
}
