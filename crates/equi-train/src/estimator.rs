//! Binary classifiers used as credit scoring candidates.
//!
//! Both estimators sit behind the [`Classifier`] trait so model selection,
//! evaluation, explanation and artifact writing never depend on a concrete
//! model type.

use crate::config::CreditScoringParams;
use crate::error::{Result, TrainingError};
use serde::{Deserialize, Serialize};
use static_assertions::assert_obj_safe;

/// A fitted-in-place binary classifier over dense features.
///
/// Class `1` is the positive class; [`predict_proba`](Self::predict_proba)
/// returns its probability for every row.
pub trait Classifier: Send + Sync {
    /// Stable identifier, e.g. `logistic_regression`.
    fn name(&self) -> &str;

    /// Fit on rows `x` with labels in `{0, 1}`.
    fn fit(&mut self, x: &[Vec<f64>], y: &[usize]) -> Result<()>;

    /// Probability of class `1` for each row.
    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<f64>>;

    /// Hard predictions at the 0.5 threshold.
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<usize>> {
        Ok(self
            .predict_proba(x)?
            .into_iter()
            .map(|p| usize::from(p >= 0.5))
            .collect())
    }

    /// Whether inputs must be standardized before `fit` / `predict_proba`.
    fn needs_scaling(&self) -> bool {
        false
    }

    /// `(weights, intercept)` of the decision function, for linear models.
    fn linear_coefficients(&self) -> Option<(&[f64], f64)> {
        None
    }

    /// Serializable parameters written to `model.json`.
    fn to_artifact(&self) -> Result<serde_json::Value>;
}

assert_obj_safe!(Classifier);

fn check_training_data(name: &str, x: &[Vec<f64>], y: &[usize]) -> Result<usize> {
    if x.is_empty() || x.len() != y.len() {
        return Err(TrainingError::TrainingFailed(format!(
            "{}: expected matching non-empty inputs, got {} rows and {} labels",
            name,
            x.len(),
            y.len()
        )));
    }
    if y.iter().any(|&label| label > 1) {
        return Err(TrainingError::TrainingFailed(format!(
            "{}: labels must be 0 or 1",
            name
        )));
    }
    Ok(x[0].len())
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// L2-regularized logistic regression fitted by batch gradient descent.
///
/// Expects standardized features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub max_iter: usize,
    pub learning_rate: f64,
    pub l2_strength: f64,
    weights: Vec<f64>,
    intercept: f64,
}

impl LogisticRegression {
    pub fn new(params: &CreditScoringParams) -> Self {
        Self {
            max_iter: params.max_iter,
            learning_rate: params.learning_rate,
            l2_strength: params.l2_strength,
            weights: Vec::new(),
            intercept: 0.0,
        }
    }

    fn decision(&self, row: &[f64]) -> f64 {
        self.intercept + self.weights.iter().zip(row).map(|(w, v)| w * v).sum::<f64>()
    }

    fn check_fitted(&self, x: &[Vec<f64>]) -> Result<()> {
        if self.weights.is_empty() {
            return Err(TrainingError::TrainingFailed(
                "logistic_regression: model is not fitted".to_string(),
            ));
        }
        if let Some(row) = x.iter().find(|r| r.len() != self.weights.len()) {
            return Err(TrainingError::InvalidData(format!(
                "logistic_regression: expected {} features, got {}",
                self.weights.len(),
                row.len()
            )));
        }
        Ok(())
    }
}

impl Classifier for LogisticRegression {
    fn name(&self) -> &str {
        "logistic_regression"
    }

    fn fit(&mut self, x: &[Vec<f64>], y: &[usize]) -> Result<()> {
        let d = check_training_data(self.name(), x, y)?;
        let n = x.len() as f64;
        self.weights = vec![0.0; d];
        self.intercept = 0.0;

        let mut grad_w = vec![0.0; d];
        for _ in 0..self.max_iter {
            grad_w.iter_mut().for_each(|g| *g = 0.0);
            let mut grad_b = 0.0;
            for (row, &label) in x.iter().zip(y) {
                let err = sigmoid(self.decision(row)) - label as f64;
                for (g, v) in grad_w.iter_mut().zip(row) {
                    *g += err * v / n;
                }
                grad_b += err / n;
            }
            for (w, g) in self.weights.iter_mut().zip(&grad_w) {
                *w -= self.learning_rate * (g + self.l2_strength * *w);
            }
            self.intercept -= self.learning_rate * grad_b;
        }

        if self.weights.iter().any(|w| !w.is_finite()) || !self.intercept.is_finite() {
            return Err(TrainingError::TrainingFailed(
                "logistic_regression: weights diverged; lower the learning rate".to_string(),
            ));
        }
        Ok(())
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        self.check_fitted(x)?;
        Ok(x.iter().map(|row| sigmoid(self.decision(row))).collect())
    }

    fn needs_scaling(&self) -> bool {
        true
    }

    fn linear_coefficients(&self) -> Option<(&[f64], f64)> {
        if self.weights.is_empty() {
            None
        } else {
            Some((&self.weights, self.intercept))
        }
    }

    fn to_artifact(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Gaussian naive Bayes with per-class feature means and variances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    pub var_smoothing: f64,
    class_log_priors: Vec<f64>,
    means: Vec<Vec<f64>>,
    variances: Vec<Vec<f64>>,
}

/// Floor applied to smoothed variances so constant features stay finite.
const MIN_VARIANCE: f64 = 1e-9;

impl GaussianNaiveBayes {
    pub fn new(params: &CreditScoringParams) -> Self {
        Self {
            var_smoothing: params.var_smoothing,
            class_log_priors: Vec::new(),
            means: Vec::new(),
            variances: Vec::new(),
        }
    }

    fn joint_log_likelihood(&self, row: &[f64], class: usize) -> f64 {
        let ll: f64 = row
            .iter()
            .zip(&self.means[class])
            .zip(&self.variances[class])
            .map(|((v, m), var)| {
                -0.5 * (2.0 * std::f64::consts::PI * var).ln() - (v - m).powi(2) / (2.0 * var)
            })
            .sum();
        self.class_log_priors[class] + ll
    }
}

impl Classifier for GaussianNaiveBayes {
    fn name(&self) -> &str {
        "gaussian_nb"
    }

    fn fit(&mut self, x: &[Vec<f64>], y: &[usize]) -> Result<()> {
        let d = check_training_data(self.name(), x, y)?;

        let mut counts = [0usize; 2];
        let mut sums = vec![vec![0.0; d]; 2];
        for (row, &label) in x.iter().zip(y) {
            counts[label] += 1;
            for (s, v) in sums[label].iter_mut().zip(row) {
                *s += v;
            }
        }
        if counts.contains(&0) {
            return Err(TrainingError::TrainingFailed(
                "gaussian_nb: both classes must be present in the training data".to_string(),
            ));
        }

        let means: Vec<Vec<f64>> = sums
            .iter()
            .zip(counts)
            .map(|(s, c)| s.iter().map(|v| v / c as f64).collect())
            .collect();
        let mut variances = vec![vec![0.0; d]; 2];
        for (row, &label) in x.iter().zip(y) {
            for ((acc, v), m) in variances[label].iter_mut().zip(row).zip(&means[label]) {
                *acc += (v - m).powi(2);
            }
        }

        // smoothing is relative to the largest overall feature variance
        let n = x.len() as f64;
        let max_variance = (0..d)
            .map(|j| {
                let mean = x.iter().map(|r| r[j]).sum::<f64>() / n;
                x.iter().map(|r| (r[j] - mean).powi(2)).sum::<f64>() / n
            })
            .fold(0.0, f64::max);
        let epsilon = self.var_smoothing * max_variance;

        for (class_vars, c) in variances.iter_mut().zip(counts) {
            for v in class_vars.iter_mut() {
                *v = (*v / c as f64 + epsilon).max(MIN_VARIANCE);
            }
        }

        self.class_log_priors = counts.iter().map(|&c| (c as f64 / n).ln()).collect();
        self.means = means;
        self.variances = variances;
        Ok(())
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        if self.means.is_empty() {
            return Err(TrainingError::TrainingFailed(
                "gaussian_nb: model is not fitted".to_string(),
            ));
        }
        Ok(x.iter()
            .map(|row| {
                let l0 = self.joint_log_likelihood(row, 0);
                let l1 = self.joint_log_likelihood(row, 1);
                // P(1) = 1 / (1 + exp(l0 - l1))
                sigmoid(l1 - l0)
            })
            .collect())
    }

    fn to_artifact(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// The credit scoring candidates, in selection order.
pub fn credit_candidates(params: &CreditScoringParams) -> Vec<Box<dyn Classifier>> {
    vec![
        Box::new(LogisticRegression::new(params)),
        Box::new(GaussianNaiveBayes::new(params)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> (Vec<Vec<f64>>, Vec<usize>) {
        let x = vec![
            vec![-2.0, 0.1],
            vec![-1.5, -0.2],
            vec![-1.0, 0.3],
            vec![1.0, -0.1],
            vec![1.5, 0.2],
            vec![2.0, 0.0],
        ];
        (x, vec![0, 0, 0, 1, 1, 1])
    }

    #[test]
    fn test_logistic_regression_separates() {
        let (x, y) = separable();
        let mut model = LogisticRegression::new(&CreditScoringParams::default());
        model.fit(&x, &y).unwrap();

        assert_eq!(model.predict(&x).unwrap(), y);
        let (weights, _) = model.linear_coefficients().unwrap();
        assert!(weights[0] > 0.0);
    }

    #[test]
    fn test_logistic_regression_requires_fit() {
        let model = LogisticRegression::new(&CreditScoringParams::default());
        assert!(model.predict_proba(&[vec![0.0]]).is_err());
        assert!(model.linear_coefficients().is_none());
    }

    #[test]
    fn test_logistic_regression_rejects_wrong_width() {
        let (x, y) = separable();
        let mut model = LogisticRegression::new(&CreditScoringParams::default());
        model.fit(&x, &y).unwrap();
        assert!(model.predict_proba(&[vec![1.0]]).is_err());
    }

    #[test]
    fn test_naive_bayes_separates() {
        let (x, y) = separable();
        let mut model = GaussianNaiveBayes::new(&CreditScoringParams::default());
        model.fit(&x, &y).unwrap();

        let proba = model.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(model.predict(&x).unwrap(), y);
        assert!(model.linear_coefficients().is_none());
    }

    #[test]
    fn test_naive_bayes_needs_both_classes() {
        let mut model = GaussianNaiveBayes::new(&CreditScoringParams::default());
        let err = model.fit(&[vec![1.0], vec![2.0]], &[0, 0]).unwrap_err();
        assert!(err.to_string().contains("both classes"));
    }

    #[test]
    fn test_labels_must_be_binary() {
        let mut model = LogisticRegression::new(&CreditScoringParams::default());
        assert!(model.fit(&[vec![1.0]], &[2]).is_err());
    }

    #[test]
    fn test_artifact_contains_parameters() {
        let (x, y) = separable();
        let mut model = LogisticRegression::new(&CreditScoringParams::default());
        model.fit(&x, &y).unwrap();
        let artifact = model.to_artifact().unwrap();
        assert_eq!(artifact["weights"].as_array().unwrap().len(), 2);
        assert!(artifact["intercept"].is_number());
    }

    #[test]
    fn test_candidate_order() {
        let names: Vec<String> = credit_candidates(&CreditScoringParams::default())
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["logistic_regression", "gaussian_nb"]);

        let scaled: Vec<bool> = credit_candidates(&CreditScoringParams::default())
            .iter()
            .map(|c| c.needs_scaling())
            .collect();
        assert_eq!(scaled, vec![true, false]);
    }
}
