//! Bucketing of protected attributes into audit groups.
//!
//! A protected attribute is either used as-is ([`Bucketing::Categorical`]) or
//! reduced to ordered bins: fixed right-closed ranges ([`Bucketing::Ranges`])
//! or quantile bins computed over the observed values
//! ([`Bucketing::Quantiles`]).
//!
//! Missing values never form a group of their own; they map to `None` and are
//! left out of every audit partition.

use crate::error::{AuditError, Result};
use serde::{Deserialize, Serialize};

/// A single observed value of a protected attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// Numeric value (ages, incomes, ...). NaN is treated as missing.
    Number(f64),
    /// Categorical value (cultural context, language, ...).
    Text(String),
    /// Null / absent value.
    Missing,
}

impl AttributeValue {
    /// Returns `true` for [`Missing`](Self::Missing) and for NaN numbers.
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Missing => true,
            Self::Number(n) => n.is_nan(),
            Self::Text(_) => false,
        }
    }

    fn categorical_key(&self) -> Option<String> {
        match self {
            _ if self.is_missing() => None,
            Self::Number(n) => Some(format!("{}", n)),
            Self::Text(s) => Some(s.clone()),
            Self::Missing => None,
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<AttributeValue>> From<Option<T>> for AttributeValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Missing, Into::into)
    }
}

/// How attribute values are turned into group keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Bucketing {
    /// Each distinct value is its own group.
    Categorical,
    /// Right-closed intervals `(edges[i], edges[i + 1]]` named by `labels[i]`.
    Ranges { edges: Vec<f64>, labels: Vec<String> },
    /// `labels.len()` equal-frequency bins over the observed values.
    /// The first bin includes its lower edge.
    Quantiles { labels: Vec<String> },
}

impl Bucketing {
    /// Fixed range bins, e.g. `Bucketing::ranges(&[0.0, 30.0, 50.0, 100.0], &["young", "middle", "senior"])`.
    pub fn ranges(edges: &[f64], labels: &[&str]) -> Self {
        Self::Ranges {
            edges: edges.to_vec(),
            labels: labels.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Quantile bins, one per label, e.g. quartiles `&["Q1", "Q2", "Q3", "Q4"]`.
    pub fn quantiles(labels: &[&str]) -> Self {
        Self::Quantiles {
            labels: labels.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Assign every value to a group key (`None` = excluded from the audit).
    ///
    /// `attribute` is only used for error messages.
    pub fn assign(&self, attribute: &str, values: &[AttributeValue]) -> Result<Vec<Option<String>>> {
        match self {
            Self::Categorical => Ok(values.iter().map(AttributeValue::categorical_key).collect()),
            Self::Ranges { edges, labels } => {
                validate_edges(attribute, edges, labels)?;
                let numbers = numeric_values(attribute, values)?;
                Ok(numbers
                    .into_iter()
                    .map(|v| v.and_then(|v| range_index(edges, v, false)).map(|i| labels[i].clone()))
                    .collect())
            }
            Self::Quantiles { labels } => {
                if labels.is_empty() {
                    return Err(AuditError::InvalidBinning {
                        attribute: attribute.to_string(),
                        reason: "at least one quantile label is required".to_string(),
                    });
                }
                let numbers = numeric_values(attribute, values)?;
                let mut observed: Vec<f64> = numbers.iter().flatten().copied().collect();
                observed.sort_by(f64::total_cmp);

                // nothing observed: every row is excluded
                let Some(edges) = quantile_edges(&observed, labels.len()) else {
                    return Ok(vec![None; numbers.len()]);
                };
                validate_edges(attribute, &edges, labels).map_err(|_| AuditError::InvalidBinning {
                    attribute: attribute.to_string(),
                    reason: format!("quantile bin edges must be unique, got {:?}", edges),
                })?;

                Ok(numbers
                    .into_iter()
                    .map(|v| v.and_then(|v| range_index(&edges, v, true)).map(|i| labels[i].clone()))
                    .collect())
            }
        }
    }
}

/// Linear-interpolated quantile of already sorted values. `p` is clamped to
/// `[0, 1]`; `None` for an empty slice.
pub fn quantile(sorted: &[f64], p: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let pos = p.clamp(0.0, 1.0) * last as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

/// `q + 1` edges splitting sorted values into `q` equal-frequency bins.
pub fn quantile_edges(sorted: &[f64], q: usize) -> Option<Vec<f64>> {
    (0..=q).map(|i| quantile(sorted, i as f64 / q as f64)).collect()
}

fn validate_edges(attribute: &str, edges: &[f64], labels: &[String]) -> Result<()> {
    if edges.len() < 2 || labels.len() != edges.len() - 1 {
        return Err(AuditError::InvalidBinning {
            attribute: attribute.to_string(),
            reason: format!(
                "{} edges cannot name {} bins",
                edges.len(),
                labels.len()
            ),
        });
    }
    if edges.windows(2).any(|w| !(w[0] < w[1])) {
        return Err(AuditError::InvalidBinning {
            attribute: attribute.to_string(),
            reason: "bin edges must be strictly increasing".to_string(),
        });
    }
    Ok(())
}

fn numeric_values(attribute: &str, values: &[AttributeValue]) -> Result<Vec<Option<f64>>> {
    values
        .iter()
        .map(|v| match v {
            _ if v.is_missing() => Ok(None),
            AttributeValue::Number(n) => Ok(Some(*n)),
            AttributeValue::Missing => Ok(None),
            AttributeValue::Text(s) => Err(AuditError::InvalidBinning {
                attribute: attribute.to_string(),
                reason: format!("cannot bin non-numeric value '{}'", s),
            }),
        })
        .collect()
}

fn range_index(edges: &[f64], value: f64, include_lowest: bool) -> Option<usize> {
    if include_lowest && value == edges[0] {
        return Some(0);
    }
    edges
        .windows(2)
        .position(|w| value > w[0] && value <= w[1])
}
