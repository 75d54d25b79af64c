//! Classification metrics used by the evaluation reports.

use crate::error::{AuditError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

/// Precision / recall / F1 for one class or one average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    #[serde(rename = "f1-score")]
    pub f1_score: f64,
    pub support: usize,
}

/// Per-class metrics plus accuracy and macro/weighted averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: BTreeMap<String, ClassMetrics>,
    pub accuracy: f64,
    #[serde(rename = "macro avg")]
    pub macro_avg: ClassMetrics,
    #[serde(rename = "weighted avg")]
    pub weighted_avg: ClassMetrics,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

fn non_empty(metric: &str, len: usize) -> Result<()> {
    if len == 0 {
        return Err(AuditError::MetricFailed {
            metric: metric.to_string(),
            reason: "no samples".to_string(),
        });
    }
    Ok(())
}

/// Fraction of predictions equal to the actual label.
pub fn accuracy<T: PartialEq>(predicted: &[T], actual: &[T]) -> Result<f64> {
    AuditError::check_lengths("predicted", predicted.len(), "actual", actual.len())?;
    non_empty("accuracy", actual.len())?;
    let correct = predicted.iter().zip(actual).filter(|(p, a)| p == a).count();
    Ok(ratio(correct, actual.len()))
}

/// Area under the ROC curve via the rank-sum statistic (ties averaged).
///
/// Returns `Ok(None)` when only one class is present, where AUC is undefined.
pub fn roc_auc(is_positive: &[bool], scores: &[f64]) -> Result<Option<f64>> {
    AuditError::check_lengths("labels", is_positive.len(), "scores", scores.len())?;
    non_empty("roc_auc", scores.len())?;

    let positives = is_positive.iter().filter(|p| **p).count();
    let negatives = is_positive.len() - positives;
    if positives == 0 || negatives == 0 {
        return Ok(None);
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // ranks are 1-based; tied run i..=j shares the mean rank
        let mean_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = mean_rank;
        }
        i = j + 1;
    }

    let positive_rank_sum: f64 = ranks
        .iter()
        .zip(is_positive)
        .filter(|(_, p)| **p)
        .map(|(r, _)| r)
        .sum();
    let p = positives as f64;
    let n = negatives as f64;
    Ok(Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n)))
}

/// Confusion matrix with rows = actual, columns = predicted, in `labels` order.
///
/// Pairs whose label is not listed are ignored.
pub fn confusion_matrix<T: PartialEq>(actual: &[T], predicted: &[T], labels: &[T]) -> Result<Vec<Vec<usize>>> {
    AuditError::check_lengths("actual", actual.len(), "predicted", predicted.len())?;
    let mut matrix = vec![vec![0usize; labels.len()]; labels.len()];
    for (a, p) in actual.iter().zip(predicted) {
        let row = labels.iter().position(|l| l == a);
        let col = labels.iter().position(|l| l == p);
        if let (Some(row), Some(col)) = (row, col) {
            matrix[row][col] += 1;
        }
    }
    Ok(matrix)
}

/// Per-class precision, recall, F1 and support over the union of labels.
pub fn classification_report<T: Ord + Display>(actual: &[T], predicted: &[T]) -> Result<ClassificationReport> {
    AuditError::check_lengths("actual", actual.len(), "predicted", predicted.len())?;
    non_empty("classification_report", actual.len())?;

    let labels: BTreeSet<&T> = actual.iter().chain(predicted).collect();
    let total = actual.len();

    let mut classes = BTreeMap::new();
    let (mut macro_p, mut macro_r, mut macro_f) = (0.0, 0.0, 0.0);
    let (mut weighted_p, mut weighted_r, mut weighted_f) = (0.0, 0.0, 0.0);

    for label in &labels {
        let mut tp = 0;
        let mut predicted_count = 0;
        let mut support = 0;
        for (a, p) in actual.iter().zip(predicted) {
            let is_actual = a == *label;
            let is_predicted = p == *label;
            if is_actual {
                support += 1;
            }
            if is_predicted {
                predicted_count += 1;
            }
            if is_actual && is_predicted {
                tp += 1;
            }
        }

        let precision = ratio(tp, predicted_count);
        let recall = ratio(tp, support);
        let f1_score = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };

        macro_p += precision;
        macro_r += recall;
        macro_f += f1_score;
        let weight = support as f64;
        weighted_p += precision * weight;
        weighted_r += recall * weight;
        weighted_f += f1_score * weight;

        classes.insert(
            label.to_string(),
            ClassMetrics {
                precision,
                recall,
                f1_score,
                support,
            },
        );
    }

    let k = labels.len() as f64;
    let n = total as f64;
    Ok(ClassificationReport {
        classes,
        accuracy: accuracy(predicted, actual)?,
        macro_avg: ClassMetrics {
            precision: macro_p / k,
            recall: macro_r / k,
            f1_score: macro_f / k,
            support: total,
        },
        weighted_avg: ClassMetrics {
            precision: weighted_p / n,
            recall: weighted_r / n,
            f1_score: weighted_f / n,
            support: total,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_accuracy() {
        assert_eq!(accuracy(&[1, 0, 1, 1], &[1, 0, 0, 1]).unwrap(), 0.75);
        assert!(accuracy::<i32>(&[], &[]).is_err());
    }

    #[test]
    fn test_roc_auc_perfect_and_inverted() {
        let labels = [false, false, true, true];
        assert_eq!(roc_auc(&labels, &[0.1, 0.2, 0.8, 0.9]).unwrap(), Some(1.0));
        assert_eq!(roc_auc(&labels, &[0.9, 0.8, 0.2, 0.1]).unwrap(), Some(0.0));
    }

    #[test]
    fn test_roc_auc_with_ties() {
        // sklearn: roc_auc_score([0, 0, 1, 1], [0.1, 0.4, 0.35, 0.8]) == 0.75
        let labels = [false, false, true, true];
        assert!(close(roc_auc(&labels, &[0.1, 0.4, 0.35, 0.8]).unwrap().unwrap(), 0.75));
        // all tied scores give 0.5
        assert!(close(roc_auc(&labels, &[0.5; 4]).unwrap().unwrap(), 0.5));
    }

    #[test]
    fn test_roc_auc_single_class() {
        assert_eq!(roc_auc(&[true, true], &[0.2, 0.3]).unwrap(), None);
    }

    #[test]
    fn test_confusion_matrix() {
        let actual = ["a", "a", "b", "c"];
        let predicted = ["a", "b", "b", "a"];
        let matrix = confusion_matrix(&actual, &predicted, &["a", "b", "c"]).unwrap();
        assert_eq!(matrix, vec![vec![1, 1, 0], vec![0, 1, 0], vec![1, 0, 0]]);
    }

    #[test]
    fn test_classification_report() {
        let actual = [0, 0, 1, 1, 1];
        let predicted = [0, 1, 1, 1, 0];
        let report = classification_report(&actual, &predicted).unwrap();

        let zero = &report.classes["0"];
        assert!(close(zero.precision, 0.5));
        assert!(close(zero.recall, 0.5));
        assert_eq!(zero.support, 2);

        let one = &report.classes["1"];
        assert!(close(one.precision, 2.0 / 3.0));
        assert!(close(one.recall, 2.0 / 3.0));
        assert_eq!(one.support, 3);

        assert!(close(report.accuracy, 0.6));
        assert!(close(report.macro_avg.recall, (0.5 + 2.0 / 3.0) / 2.0));
        assert!(close(report.weighted_avg.recall, 0.6));
        assert_eq!(report.weighted_avg.support, 5);
    }

    #[test]
    fn test_report_includes_predicted_only_labels() {
        let report = classification_report(&["a", "a"], &["a", "z"]).unwrap();
        assert_eq!(report.classes["z"].support, 0);
        assert_eq!(report.classes["z"].precision, 0.0);
    }

    #[test]
    fn test_report_serializes_sklearn_keys() {
        let report = classification_report(&[0, 1], &[0, 1]).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("macro avg").is_some());
        assert!(json["weighted avg"].get("f1-score").is_some());
    }
}
