//! Polars column readers.
//!
//! Audit inputs are plain Rust vectors; these helpers pull them out of a
//! `DataFrame` once so the rest of the crate never touches Polars types.

use crate::binning::AttributeValue;
use crate::error::{AuditError, Result, ResultExt};
use polars::prelude::*;

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

fn series<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map(|col| col.as_materialized_series())
        .map_err(|_| AuditError::ColumnNotFound(name.to_string()))
}

/// Read a column as `f64`, nulls (and unparseable strings) as `None`.
pub fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let float_series = series(df, name)?
        .cast(&DataType::Float64)
        .context(format!("Casting '{}' to Float64", name))?;
    let values = float_series.f64()?;
    Ok(values.into_iter().collect())
}

/// Read a column as strings; non-string columns use their display form.
pub fn text_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let str_series = series(df, name)?
        .cast(&DataType::String)
        .context(format!("Casting '{}' to String", name))?;
    let values = str_series.str()?;
    Ok(values.into_iter().map(|v| v.map(str::to_string)).collect())
}

/// Read a column as audit attribute values: numeric dtypes become
/// [`AttributeValue::Number`], everything else [`AttributeValue::Text`].
pub fn attribute_values(df: &DataFrame, name: &str) -> Result<Vec<AttributeValue>> {
    let dtype = series(df, name)?.dtype().clone();
    if is_numeric_dtype(&dtype) {
        Ok(numeric_column(df, name)?.into_iter().map(AttributeValue::from).collect())
    } else {
        Ok(text_column(df, name)?.into_iter().map(AttributeValue::from).collect())
    }
}
