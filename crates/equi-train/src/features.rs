//! Feature engineering and encoders.

use crate::dataset::CreditRecord;
use crate::error::{Result, TrainingError};
use equi_audit::{AttributeValue, Bucketing};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

/// Row-major feature matrix.
pub type Matrix = Vec<Vec<f64>>;

/// Numerical credit features, in model column order.
pub const CREDIT_NUMERICAL_FEATURES: [&str; 5] = [
    "age",
    "income",
    "loan_amount",
    "employment_years",
    "debt_to_income",
];

/// Label-encoded credit features, following the numerical ones.
pub const CREDIT_CATEGORICAL_FEATURES: [&str; 3] = ["credit_history", "age_group", "income_bracket"];

/// Maps string classes to dense indices in sorted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fit on the distinct values, sorted.
    pub fn fit<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let classes: BTreeSet<String> = values.into_iter().map(|v| v.as_ref().to_string()).collect();
        Self {
            classes: classes.into_iter().collect(),
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn transform(&self, value: &str) -> Option<usize> {
        self.classes.binary_search_by(|c| c.as_str().cmp(value)).ok()
    }

    /// Encode every value; unknown values are an error.
    pub fn transform_all<S: AsRef<str>>(&self, values: &[S]) -> Result<Vec<usize>> {
        values
            .iter()
            .map(|v| {
                self.transform(v.as_ref()).ok_or_else(|| {
                    TrainingError::InvalidData(format!("unknown label '{}'", v.as_ref()))
                })
            })
            .collect()
    }

    pub fn inverse(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }
}

/// Standardizes columns to zero mean and unit (population) variance.
///
/// Constant columns are centered only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(x: &[Vec<f64>]) -> Result<Self> {
        let first = x
            .first()
            .ok_or_else(|| TrainingError::InvalidData("cannot fit scaler on zero rows".to_string()))?;
        let n = x.len() as f64;
        let d = first.len();

        let mut means = vec![0.0; d];
        for row in x {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v / n;
            }
        }
        let mut scales = vec![0.0; d];
        for row in x {
            for ((s, v), m) in scales.iter_mut().zip(row).zip(&means) {
                *s += (v - m).powi(2) / n;
            }
        }
        for s in &mut scales {
            *s = if *s > 0.0 { s.sqrt() } else { 1.0 };
        }
        Ok(Self { means, scales })
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }

    pub fn transform(&self, x: &[Vec<f64>]) -> Matrix {
        x.iter().map(|row| self.transform_row(row)).collect()
    }
}

/// Credit records turned into a model-ready matrix.
#[derive(Debug, Clone)]
pub struct CreditFeatures {
    pub feature_names: Vec<String>,
    pub rows: Matrix,
    /// Encoded target, `1` = the second sorted class (the risk class).
    pub labels: Vec<usize>,
    pub label_encoder: LabelEncoder,
    /// Encoders of the categorical features, in [`CREDIT_CATEGORICAL_FEATURES`] order.
    pub categorical_encoders: Vec<LabelEncoder>,
}

/// Derive `debt_to_income`, `age_group`, `income_bracket` and encode.
///
/// Rows whose engineered bucket is missing encode that feature as `-1`.
pub fn engineer_credit_features(records: &[CreditRecord]) -> Result<CreditFeatures> {
    info!("Preparing features...");

    if let Some(r) = records.iter().find(|r| r.income == 0.0) {
        return Err(TrainingError::InvalidData(format!(
            "income must be non-zero to derive debt_to_income (age {}, loan {})",
            r.age, r.loan_amount
        )));
    }

    let ages: Vec<AttributeValue> = records.iter().map(|r| r.age.into()).collect();
    let incomes: Vec<AttributeValue> = records.iter().map(|r| r.income.into()).collect();
    let age_group = Bucketing::ranges(&[0.0, 25.0, 35.0, 50.0, 100.0], &["young", "adult", "middle", "senior"])
        .assign("age", &ages)?;
    let income_bracket = Bucketing::quantiles(&["low", "low_mid", "mid", "mid_high", "high"])
        .assign("income", &incomes)?;
    let credit_history: Vec<Option<String>> =
        records.iter().map(|r| Some(r.credit_history.clone())).collect();

    let categorical = [credit_history, age_group, income_bracket];
    let categorical_encoders: Vec<LabelEncoder> = categorical
        .iter()
        .map(|column| LabelEncoder::fit(column.iter().flatten()))
        .collect();

    let rows: Matrix = records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let mut row = vec![
                r.age,
                r.income,
                r.loan_amount,
                r.employment_years,
                r.loan_amount / r.income,
            ];
            for (column, encoder) in categorical.iter().zip(&categorical_encoders) {
                let code = column[i]
                    .as_deref()
                    .and_then(|v| encoder.transform(v))
                    .map_or(-1.0, |c| c as f64);
                row.push(code);
            }
            row
        })
        .collect();

    let label_encoder = LabelEncoder::fit(records.iter().map(|r| r.default_risk.as_str()));
    if label_encoder.len() != 2 {
        return Err(TrainingError::InvalidData(format!(
            "default_risk must have exactly two classes, found {:?}",
            label_encoder.classes()
        )));
    }
    let labels = label_encoder.transform_all(
        &records.iter().map(|r| r.default_risk.as_str()).collect::<Vec<_>>(),
    )?;

    let feature_names: Vec<String> = CREDIT_NUMERICAL_FEATURES
        .iter()
        .chain(CREDIT_CATEGORICAL_FEATURES.iter())
        .map(|s| s.to_string())
        .collect();

    info!("Features prepared: ({}, {})", rows.len(), feature_names.len());
    Ok(CreditFeatures {
        feature_names,
        rows,
        labels,
        label_encoder,
        categorical_encoders,
    })
}

/// Select rows by index.
pub fn take_rows<T: Clone>(values: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| values[i].clone()).collect()
}
