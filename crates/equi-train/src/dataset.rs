//! Dataset loading and validation.
//!
//! Files are read with Polars and converted into typed records straight
//! away; everything downstream works on [`CreditRecord`] / [`DsmRecord`].

use crate::error::{Result, TrainingError};
use equi_audit::frame::{numeric_column, text_column};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, warn};

/// Columns the credit dataset must provide.
pub const CREDIT_REQUIRED_COLUMNS: [&str; 6] = [
    "age",
    "income",
    "credit_history",
    "loan_amount",
    "employment_years",
    "default_risk",
];

/// Columns the DSM dataset must provide.
pub const DSM_REQUIRED_COLUMNS: [&str; 5] = [
    "symptoms",
    "dsm_category",
    "dsm_code",
    "language",
    "cultural_context",
];

/// One loan applicant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditRecord {
    pub age: f64,
    pub income: f64,
    pub credit_history: String,
    pub loan_amount: f64,
    pub employment_years: f64,
    /// Raw label value as written in the file (e.g. `"0"` / `"1"`).
    pub default_risk: String,
}

/// One symptom description with its diagnostic category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DsmRecord {
    pub symptoms: String,
    pub dsm_category: String,
    pub dsm_code: Option<String>,
    pub language: Option<String>,
    pub cultural_context: Option<String>,
    /// Filled in by [`crate::dsm::apply_cultural_adaptations`].
    #[serde(default)]
    pub cultural_adaptations: Vec<String>,
}

/// Read a CSV or JSON file into a `DataFrame`.
///
/// # Errors
///
/// - [`TrainingError::DatasetNotFound`] if `path` does not exist
/// - [`TrainingError::UnsupportedFormat`] if the extension is not in `allowed`
pub fn load_frame(path: &Path, allowed: &[&str]) -> Result<DataFrame> {
    if !path.exists() {
        return Err(TrainingError::DatasetNotFound {
            path: path.display().to_string(),
        });
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if !allowed.contains(&extension.as_str()) {
        return Err(TrainingError::UnsupportedFormat {
            path: path.display().to_string(),
            extension,
        });
    }

    let df = match extension.as_str() {
        "csv" => CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?,
        "json" => JsonReader::new(File::open(path)?).finish()?,
        _ => {
            return Err(TrainingError::UnsupportedFormat {
                path: path.display().to_string(),
                extension,
            });
        }
    };

    debug!("Read {:?} from {}", df.shape(), path.display());
    Ok(df)
}

/// Fail with every missing column listed at once.
pub fn require_columns(df: &DataFrame, required: &[&str]) -> Result<()> {
    let present: BTreeSet<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    let missing: Vec<String> = required
        .iter()
        .filter(|c| !present.contains(**c))
        .map(|c| c.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(TrainingError::MissingColumns(missing))
    }
}

/// Convert a validated frame into credit records, dropping incomplete rows.
pub fn credit_records(df: &DataFrame) -> Result<Vec<CreditRecord>> {
    require_columns(df, &CREDIT_REQUIRED_COLUMNS)?;

    let age = numeric_column(df, "age")?;
    let income = numeric_column(df, "income")?;
    let credit_history = text_column(df, "credit_history")?;
    let loan_amount = numeric_column(df, "loan_amount")?;
    let employment_years = numeric_column(df, "employment_years")?;
    let default_risk = text_column(df, "default_risk")?;

    let mut records = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let row = (
            age[i],
            income[i],
            credit_history[i].clone(),
            loan_amount[i],
            employment_years[i],
            default_risk[i].clone(),
        );
        if let (Some(age), Some(income), Some(credit_history), Some(loan_amount), Some(employment_years), Some(default_risk)) = row {
            if [age, income, loan_amount, employment_years].iter().any(|v| v.is_nan()) {
                continue;
            }
            records.push(CreditRecord {
                age,
                income,
                credit_history,
                loan_amount,
                employment_years,
                default_risk: default_risk.trim().to_string(),
            });
        }
    }

    let dropped = df.height() - records.len();
    if dropped > 0 {
        warn!("Dropped {} incomplete rows", dropped);
    }
    if records.is_empty() {
        return Err(TrainingError::InvalidData(
            "no complete rows left after dropping missing values".to_string(),
        ));
    }
    Ok(records)
}

/// Convert a validated frame into DSM records.
///
/// Rows without symptoms or category are dropped; both fields are trimmed.
pub fn dsm_records(df: &DataFrame) -> Result<Vec<DsmRecord>> {
    require_columns(df, &DSM_REQUIRED_COLUMNS)?;

    let symptoms = text_column(df, "symptoms")?;
    let category = text_column(df, "dsm_category")?;
    let code = text_column(df, "dsm_code")?;
    let language = text_column(df, "language")?;
    let context = text_column(df, "cultural_context")?;

    let records: Vec<DsmRecord> = (0..df.height())
        .filter_map(|i| {
            let symptoms = symptoms[i].as_deref()?.trim().to_string();
            let dsm_category = category[i].as_deref()?.trim().to_string();
            Some(DsmRecord {
                symptoms,
                dsm_category,
                dsm_code: code[i].clone(),
                language: language[i].clone(),
                cultural_context: context[i].clone(),
                cultural_adaptations: Vec::new(),
            })
        })
        .collect();

    if records.is_empty() {
        return Err(TrainingError::InvalidData(
            "no rows with both symptoms and dsm_category".to_string(),
        ));
    }
    Ok(records)
}

/// Load and validate the credit scoring dataset (CSV only).
pub fn load_credit_dataset(path: &Path) -> Result<Vec<CreditRecord>> {
    info!("Loading credit dataset from {}", path.display());
    let df = load_frame(path, &["csv"])?;
    let records = credit_records(&df)?;

    info!("Dataset loaded: {} samples", records.len());
    info!(
        "Target distribution: {:?}",
        value_counts(records.iter().map(|r| r.default_risk.as_str()))
    );
    Ok(records)
}

/// Load and validate the DSM dataset (CSV or JSON).
pub fn load_dsm_dataset(path: &Path) -> Result<Vec<DsmRecord>> {
    info!("Loading DSM dataset from {}", path.display());
    let df = load_frame(path, &["csv", "json"])?;
    let records = dsm_records(&df)?;

    let languages = value_counts(records.iter().filter_map(|r| r.language.as_deref()));
    let categories = value_counts(records.iter().map(|r| r.dsm_category.as_str()));
    info!("Dataset loaded: {} samples", records.len());
    info!("Languages: {:?}", languages.keys().collect::<Vec<_>>());
    info!("DSM categories: {}", categories.len());
    Ok(records)
}

/// Occurrences of each distinct value.
pub fn value_counts<'a>(values: impl IntoIterator<Item = &'a str>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for value in values {
        *counts.entry(value.to_string()).or_insert(0) += 1;
    }
    counts
}
