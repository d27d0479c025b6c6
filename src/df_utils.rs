use anyhow::{Context, Result};
use polars::prelude::*;

use crate::error::PolylocError;
use crate::schema::normalize_headers;

/// Renames every column to its trimmed upper-case form.
pub fn uppercase_column_names(df: &mut DataFrame) -> Result<Vec<String>> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let upper = normalize_headers(&names);
    for (old, new) in names.iter().zip(&upper) {
        if old != new {
            df.rename(old, new.as_str().into())
                .with_context(|| format!("rename column {old} to {new}"))?;
        }
    }
    Ok(upper)
}

pub fn drop_cols_if_present(df: &mut DataFrame, names: &[&str]) -> Result<()> {
    for name in names {
        if df.column(name).is_ok() {
            df.drop_in_place(name)?;
        }
    }
    Ok(())
}

pub fn rename_last_column(df: &mut DataFrame, name: &str) -> Result<()> {
    let cols = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>();
    if let Some(last) = cols.last() {
        df.rename(last, name.into())?;
    }
    Ok(())
}

pub fn optional_f64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)?
        .cast(&DataType::Float64)
        .with_context(|| format!("cast {name} to float"))?;
    let values = column.f64().context("f64 column")?;
    Ok(values.into_iter().collect())
}

/// Float column with every value present and finite.
pub fn required_f64_column(df: &DataFrame, name: &str, source: &str) -> Result<Vec<f64>> {
    let values = optional_f64_column(df, name)?;
    let mut out = Vec::with_capacity(values.len());
    for (row, value) in values.into_iter().enumerate() {
        match value {
            Some(v) if v.is_finite() => out.push(v),
            _ => {
                return Err(PolylocError::DataIntegrity(format!(
                    "{source}: column {name} has a missing or non-numeric value on data row {}",
                    row + 1
                ))
                .into());
            }
        }
    }
    Ok(out)
}

pub fn required_i64_column(df: &DataFrame, name: &str, source: &str) -> Result<Vec<i64>> {
    let column = df
        .column(name)?
        .cast(&DataType::Int64)
        .with_context(|| format!("cast {name} to integer"))?;
    let values = column.i64().context("i64 column")?;
    let mut out = Vec::with_capacity(values.len());
    for (row, value) in values.into_iter().enumerate() {
        match value {
            Some(v) => out.push(v),
            None => {
                return Err(PolylocError::DataIntegrity(format!(
                    "{source}: column {name} has a missing or non-integer value on data row {}",
                    row + 1
                ))
                .into());
            }
        }
    }
    Ok(out)
}

pub fn required_string_column(df: &DataFrame, name: &str, source: &str) -> Result<Vec<String>> {
    let column = df
        .column(name)?
        .cast(&DataType::String)
        .with_context(|| format!("cast {name} to string"))?;
    let values = column.str().context("string column")?;
    let mut out = Vec::with_capacity(values.len());
    for (row, value) in values.into_iter().enumerate() {
        match value {
            Some(v) if !v.trim().is_empty() => out.push(v.trim().to_string()),
            _ => {
                return Err(PolylocError::DataIntegrity(format!(
                    "{source}: column {name} is empty on data row {}",
                    row + 1
                ))
                .into());
            }
        }
    }
    Ok(out)
}
