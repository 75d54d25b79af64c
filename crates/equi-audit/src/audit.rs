//! Group-wise fairness audit of classifier predictions.
//!
//! The audit partitions an evaluation set by one or more protected attributes,
//! summarizes each non-empty group and reduces the per-group approval rates to
//! a single disparity scalar, the demographic parity difference
//! (`max(approval_rate) - min(approval_rate)`).
//!
//! # Example
//!
//! ```
//! use equi_audit::FairnessAudit;
//!
//! let predictions = [1u32, 1, 0, 1, 1, 1, 1];
//! let probabilities = [0.9, 0.8, 0.2, 0.7, 0.9, 0.6, 0.8];
//! let groups = ["A", "A", "A", "B", "B", "B", "B"]
//!     .iter()
//!     .map(|g| Some(g.to_string()))
//!     .collect();
//!
//! let report = FairnessAudit::builder()
//!     .favorable_label(0u32)
//!     .attribute("", groups)
//!     .build()
//!     .unwrap()
//!     .run(&predictions, &probabilities)
//!     .unwrap();
//!
//! assert!((report.groups["A"].approval_rate - 1.0 / 3.0).abs() < 1e-12);
//! assert_eq!(report.groups["B"].approval_rate, 0.0);
//! ```

use crate::error::{AuditError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt::Display;
use tracing::{debug, info};

/// Summary statistics for one non-empty audit group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    /// Fraction of the group's predictions equal to the favorable label.
    pub approval_rate: f64,
    /// Number of evaluation rows in the group.
    pub sample_size: usize,
    /// Mean predicted probability of the positive (unfavorable) class.
    pub avg_probability: f64,
}

/// Audit of a single protected attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeAudit {
    /// Attribute prefix used for scoped keys (may be empty).
    pub attribute: String,
    /// Per-group statistics keyed by the unscoped group label.
    pub groups: BTreeMap<String, GroupStats>,
    /// Parity difference within this attribute alone.
    pub demographic_parity_difference: Option<f64>,
}

/// Merged audit over every configured attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairnessReport {
    /// Display form of the label counted as approval.
    pub favorable_label: String,
    /// Per-group statistics keyed by `<attribute>_<group>`.
    pub groups: BTreeMap<String, GroupStats>,
    /// Parity difference of each attribute, keyed by attribute prefix.
    pub attribute_parity: BTreeMap<String, f64>,
    /// `max - min` approval rate across all merged groups; `None` when no group
    /// has members.
    pub demographic_parity_difference: Option<f64>,
}

/// Accuracy statistics for one non-empty group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyGroupStats {
    pub accuracy: f64,
    pub sample_size: usize,
    /// Predicted label → count within the group.
    pub prediction_distribution: BTreeMap<String, usize>,
}

/// Accuracy-based audit, used where no single favorable label exists
/// (multi-class diagnosis).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyAudit {
    pub groups: BTreeMap<String, AccuracyGroupStats>,
    /// `max - min` accuracy across groups; `None` when no group has members.
    pub accuracy_parity_difference: Option<f64>,
}

#[derive(Default)]
struct Tally {
    approved: usize,
    count: usize,
    probability_sum: f64,
}

/// `max - min` of the given rates, `None` for an empty input.
pub fn parity_difference(rates: impl IntoIterator<Item = f64>) -> Option<f64> {
    rates
        .into_iter()
        .fold(None, |acc: Option<(f64, f64)>, rate| match acc {
            None => Some((rate, rate)),
            Some((lo, hi)) => Some((lo.min(rate), hi.max(rate))),
        })
        .map(|(lo, hi)| hi - lo)
}

/// Audit one attribute.
///
/// `groups[i]` is the group key of row `i`; `None` rows are excluded.
/// `probabilities[i]` is the predicted probability of the unfavorable class.
pub fn audit_attribute<T: PartialEq>(
    attribute: &str,
    predictions: &[T],
    probabilities: &[f64],
    groups: &[Option<String>],
    favorable: &T,
) -> Result<AttributeAudit> {
    AuditError::check_lengths("predictions", predictions.len(), "probabilities", probabilities.len())?;
    AuditError::check_lengths("predictions", predictions.len(), "groups", groups.len())?;

    let mut tallies: BTreeMap<&str, Tally> = BTreeMap::new();
    for ((prediction, probability), group) in predictions.iter().zip(probabilities).zip(groups) {
        let Some(group) = group else { continue };
        let tally = tallies.entry(group.as_str()).or_default();
        tally.count += 1;
        tally.probability_sum += probability;
        if prediction == favorable {
            tally.approved += 1;
        }
    }

    let groups: BTreeMap<String, GroupStats> = tallies
        .into_iter()
        .filter(|(_, t)| t.count > 0)
        .map(|(group, t)| {
            let n = t.count as f64;
            (
                group.to_string(),
                GroupStats {
                    approval_rate: t.approved as f64 / n,
                    sample_size: t.count,
                    avg_probability: t.probability_sum / n,
                },
            )
        })
        .collect();

    let demographic_parity_difference = parity_difference(groups.values().map(|g| g.approval_rate));
    debug!(
        attribute,
        groups = groups.len(),
        parity = ?demographic_parity_difference,
        "Audited attribute"
    );

    Ok(AttributeAudit {
        attribute: attribute.to_string(),
        groups,
        demographic_parity_difference,
    })
}

/// Audit per-group accuracy of multi-class predictions.
pub fn audit_accuracy_by_group<T: PartialEq + Display>(
    predicted: &[T],
    actual: &[T],
    groups: &[Option<String>],
) -> Result<AccuracyAudit> {
    AuditError::check_lengths("predicted", predicted.len(), "actual", actual.len())?;
    AuditError::check_lengths("predicted", predicted.len(), "groups", groups.len())?;

    let mut tallies: BTreeMap<&str, (usize, BTreeMap<String, usize>)> = BTreeMap::new();
    for ((p, a), group) in predicted.iter().zip(actual).zip(groups) {
        let Some(group) = group else { continue };
        let (correct, distribution) = tallies.entry(group.as_str()).or_default();
        if p == a {
            *correct += 1;
        }
        *distribution.entry(p.to_string()).or_default() += 1;
    }

    let groups: BTreeMap<String, AccuracyGroupStats> = tallies
        .into_iter()
        .map(|(group, (correct, prediction_distribution))| {
            let sample_size: usize = prediction_distribution.values().sum();
            (
                group.to_string(),
                AccuracyGroupStats {
                    accuracy: correct as f64 / sample_size as f64,
                    sample_size,
                    prediction_distribution,
                },
            )
        })
        .collect();

    let accuracy_parity_difference = parity_difference(groups.values().map(|g| g.accuracy));
    Ok(AccuracyAudit {
        groups,
        accuracy_parity_difference,
    })
}

/// A configured multi-attribute fairness audit.
///
/// Build with [`FairnessAudit::builder()`]; the favorable label is required so
/// the meaning of "approval" is always explicit.
#[derive(Debug, Clone)]
pub struct FairnessAudit<T> {
    favorable: T,
    attributes: Vec<(String, Vec<Option<String>>)>,
}

impl<T: PartialEq + Display> FairnessAudit<T> {
    pub fn builder() -> FairnessAuditBuilder<T> {
        FairnessAuditBuilder {
            favorable: None,
            attributes: Vec::new(),
        }
    }

    /// The label counted as approval.
    pub fn favorable_label(&self) -> &T {
        &self.favorable
    }

    /// Run every attribute audit and merge the results under scoped keys.
    ///
    /// `probabilities` are unfavorable-class probabilities, averaged into
    /// [`GroupStats::avg_probability`].
    pub fn run(&self, predictions: &[T], probabilities: &[f64]) -> Result<FairnessReport> {
        let mut groups = BTreeMap::new();
        let mut attribute_parity = BTreeMap::new();

        for (prefix, keys) in &self.attributes {
            let audit = audit_attribute(prefix, predictions, probabilities, keys, &self.favorable)?;
            if let Some(parity) = audit.demographic_parity_difference {
                attribute_parity.insert(prefix.clone(), parity);
            }
            for (group, stats) in audit.groups {
                let key = scoped_key(prefix, &group);
                match groups.entry(key) {
                    Entry::Vacant(slot) => {
                        slot.insert(stats);
                    }
                    Entry::Occupied(slot) => {
                        return Err(AuditError::InvalidConfig(format!(
                            "group key '{}' produced by more than one attribute",
                            slot.key()
                        )));
                    }
                }
            }
        }

        let demographic_parity_difference =
            parity_difference(groups.values().map(|g: &GroupStats| g.approval_rate));

        match demographic_parity_difference {
            Some(parity) => info!("Demographic parity difference: {:.4}", parity),
            None => info!("Demographic parity difference: N/A (no populated groups)"),
        }

        Ok(FairnessReport {
            favorable_label: self.favorable.to_string(),
            groups,
            attribute_parity,
            demographic_parity_difference,
        })
    }
}

fn scoped_key(prefix: &str, group: &str) -> String {
    if prefix.is_empty() {
        group.to_string()
    } else {
        format!("{}_{}", prefix, group)
    }
}

/// Builder for [`FairnessAudit`].
#[derive(Debug)]
pub struct FairnessAuditBuilder<T> {
    favorable: Option<T>,
    attributes: Vec<(String, Vec<Option<String>>)>,
}

impl<T: PartialEq + Display> FairnessAuditBuilder<T> {
    /// Set the label counted as approval (required).
    pub fn favorable_label(mut self, label: T) -> Self {
        self.favorable = Some(label);
        self
    }

    /// Add an attribute with precomputed per-row group keys.
    ///
    /// Merged keys are `<prefix>_<group>`, or just `<group>` for an empty prefix.
    pub fn attribute(mut self, prefix: impl Into<String>, groups: Vec<Option<String>>) -> Self {
        self.attributes.push((prefix.into(), groups));
        self
    }

    /// Build the audit.
    ///
    /// Fails when no favorable label was given, no attribute was added, or an
    /// attribute prefix is repeated.
    pub fn build(self) -> Result<FairnessAudit<T>> {
        let favorable = self.favorable.ok_or_else(|| {
            AuditError::InvalidConfig("a favorable label is required".to_string())
        })?;

        if self.attributes.is_empty() {
            return Err(AuditError::InvalidConfig(
                "at least one attribute is required".to_string(),
            ));
        }

        for (i, (prefix, _)) in self.attributes.iter().enumerate() {
            if self.attributes[..i].iter().any(|(p, _)| p == prefix) {
                return Err(AuditError::InvalidConfig(format!(
                    "attribute '{}' added twice",
                    prefix
                )));
            }
        }

        Ok(FairnessAudit {
            favorable,
            attributes: self.attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn groups(keys: &[Option<&str>]) -> Vec<Option<String>> {
        keys.iter().map(|k| k.map(str::to_string)).collect()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_two_group_scenario() {
        // A: [1, 1, 0], B: [1, 1, 1, 1], favorable = 0
        let predictions = [1, 1, 0, 1, 1, 1, 1];
        let probabilities = [0.8, 0.6, 0.1, 0.9, 0.7, 0.5, 0.9];
        let keys = groups(&[Some("A"), Some("A"), Some("A"), Some("B"), Some("B"), Some("B"), Some("B")]);

        let audit = audit_attribute("", &predictions, &probabilities, &keys, &0).unwrap();

        assert!(close(audit.groups["A"].approval_rate, 1.0 / 3.0));
        assert_eq!(audit.groups["B"].approval_rate, 0.0);
        assert_eq!(audit.groups["A"].sample_size, 3);
        assert_eq!(audit.groups["B"].sample_size, 4);
        assert!(close(audit.groups["A"].avg_probability, 0.5));
        assert!(close(audit.groups["B"].avg_probability, 0.75));
        assert!(close(audit.demographic_parity_difference.unwrap(), 1.0 / 3.0));
    }

    #[test]
    fn test_single_group_all_approved() {
        let predictions = [0; 5];
        let probabilities = [0.1; 5];
        let keys = groups(&[Some("only"); 5]);

        let audit = audit_attribute("", &predictions, &probabilities, &keys, &0).unwrap();

        assert_eq!(audit.groups.len(), 1);
        assert_eq!(audit.groups["only"].approval_rate, 1.0);
        assert_eq!(audit.demographic_parity_difference, Some(0.0));
    }

    #[test]
    fn test_missing_keys_are_excluded() {
        let predictions = [0, 1, 1];
        let probabilities = [0.2, 0.9, 0.9];
        let keys = groups(&[Some("A"), None, None]);

        let audit = audit_attribute("age", &predictions, &probabilities, &keys, &0).unwrap();

        assert_eq!(audit.groups.len(), 1);
        assert_eq!(audit.groups["A"].sample_size, 1);
        assert_eq!(audit.demographic_parity_difference, Some(0.0));
    }

    #[test]
    fn test_no_populated_groups() {
        let audit = audit_attribute::<i32>("age", &[1], &[0.5], &[None], &0).unwrap();
        assert!(audit.groups.is_empty());
        assert_eq!(audit.demographic_parity_difference, None);
    }

    #[test]
    fn test_rates_are_bounded_and_sizes_match() {
        let predictions = [0, 1, 0, 0, 1, 1, 0, 1, 0];
        let probabilities = [0.3, 0.7, 0.2, 0.4, 0.9, 0.8, 0.1, 0.6, 0.5];
        let keys = groups(&[
            Some("x"),
            Some("y"),
            Some("z"),
            Some("x"),
            Some("y"),
            None,
            Some("z"),
            Some("x"),
            Some("y"),
        ]);

        let audit = audit_attribute("g", &predictions, &probabilities, &keys, &0).unwrap();

        for (group, stats) in &audit.groups {
            assert!((0.0..=1.0).contains(&stats.approval_rate));
            let expected = keys.iter().filter(|k| k.as_deref() == Some(group.as_str())).count();
            assert_eq!(stats.sample_size, expected);
        }
        let rates: Vec<f64> = audit.groups.values().map(|g| g.approval_rate).collect();
        let max = rates.iter().cloned().fold(f64::MIN, f64::max);
        let min = rates.iter().cloned().fold(f64::MAX, f64::min);
        assert!(close(audit.demographic_parity_difference.unwrap(), max - min));
    }

    #[test]
    fn test_length_mismatch() {
        let err = audit_attribute("g", &[0, 1], &[0.1], &groups(&[Some("a"), Some("b")]), &0)
            .unwrap_err();
        assert_eq!(err.error_code(), "LENGTH_MISMATCH");
    }

    #[test]
    fn test_multi_attribute_merge() {
        let predictions = [0, 1, 0, 1];
        let probabilities = [0.1, 0.9, 0.2, 0.8];

        let report = FairnessAudit::builder()
            .favorable_label(0)
            .attribute("age", groups(&[Some("young"), Some("young"), Some("senior"), None]))
            .attribute("income", groups(&[Some("Q1"), Some("Q2"), Some("Q1"), Some("Q2")]))
            .build()
            .unwrap()
            .run(&predictions, &probabilities)
            .unwrap();

        let keys: Vec<&str> = report.groups.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["age_senior", "age_young", "income_Q1", "income_Q2"]);
        assert_eq!(report.groups["age_senior"].approval_rate, 1.0);
        assert_eq!(report.groups["income_Q2"].approval_rate, 0.0);
        assert_eq!(report.demographic_parity_difference, Some(1.0));
        assert_eq!(report.attribute_parity["age"], 0.5);
        assert_eq!(report.attribute_parity["income"], 1.0);
        assert_eq!(report.favorable_label, "0");
    }

    #[test]
    fn test_builder_requires_favorable_label() {
        let err = FairnessAudit::<u32>::builder()
            .attribute("age", vec![])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("favorable label"));
    }

    #[test]
    fn test_builder_rejects_duplicate_attribute() {
        let err = FairnessAudit::builder()
            .favorable_label(0)
            .attribute("age", vec![])
            .attribute("age", vec![])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("added twice"));
    }

    #[test]
    fn test_accuracy_audit() {
        let predicted = ["MDD", "GAD", "MDD", "PTSD"];
        let actual = ["MDD", "MDD", "MDD", "PTSD"];
        let keys = groups(&[Some("European"), Some("European"), Some("East African"), None]);

        let audit = audit_accuracy_by_group(&predicted, &actual, &keys).unwrap();

        assert_eq!(audit.groups["European"].accuracy, 0.5);
        assert_eq!(audit.groups["European"].sample_size, 2);
        assert_eq!(audit.groups["European"].prediction_distribution["GAD"], 1);
        assert_eq!(audit.groups["East African"].accuracy, 1.0);
        assert_eq!(audit.accuracy_parity_difference, Some(0.5));
        assert!(!audit.groups.contains_key("PTSD"));
    }

    #[test]
    fn test_parity_difference_empty() {
        assert_eq!(parity_difference(Vec::<f64>::new()), None);
        assert_eq!(parity_difference(vec![0.25]), Some(0.0));
    }
}
