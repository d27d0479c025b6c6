use std::collections::HashSet;

use crate::error::{PolylocError, Result};

/// Identity columns shared by the posterior file and the persisted bin files.
pub const SNP_COLUMNS: [&str; 5] = ["CHR", "SNP", "BP", "A1", "A2"];

pub const POSTERIOR_COLUMNS: [&str; 7] = ["CHR", "SNP", "BP", "A1", "A2", "BETA_MEAN", "BETA_SD"];

pub const SUMSTATS_COLUMNS: [&str; 3] = ["SNP", "Z", "N"];

pub fn normalize_headers(headers: &[String]) -> Vec<String> {
    headers
        .iter()
        .map(|h| h.trim().to_ascii_uppercase())
        .collect()
}

/// Checks a normalized header row against the required columns.
///
/// All missing columns are reported in one error, and a column appearing twice
/// after case normalization is rejected as ambiguous.
pub fn require_columns(headers: &[String], required: &[&str], filename: &str) -> Result<()> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h == col))
        .collect();
    if !missing.is_empty() {
        return Err(PolylocError::DataIntegrity(format!(
            "{filename} has missing columns: {}",
            missing.join(", ")
        )));
    }

    let mut seen = HashSet::new();
    for col in required {
        for h in headers.iter().filter(|h| h.as_str() == *col) {
            if !seen.insert(h.as_str()) {
                return Err(PolylocError::DataIntegrity(format!(
                    "{filename} has multiple columns interpreted as {col}"
                )));
            }
        }
    }
    Ok(())
}
