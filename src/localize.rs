use std::path::Path;

use crate::error::{PolylocError, Result};
use crate::io::{StagedFile, stage_text};
use crate::qc::check_equal_length;
use crate::types::{BinSize, LocalizationResult, LocalizationRow};

/// Combines per-bin coefficients with bin sizes into heritability shares and
/// their running sum in bin-number order.
///
/// `coefficients[i]` belongs to `sizes[i]`. The bins are never re-sorted.
pub fn localize(coefficients: &[f64], sizes: &[BinSize]) -> Result<LocalizationResult> {
    check_equal_length(coefficients.len(), sizes.len(), "coefficients", "bins")?;

    let contributions: Vec<f64> = coefficients
        .iter()
        .zip(sizes)
        .map(|(tau, s)| tau * s.size as f64)
        .collect();
    let total: f64 = contributions.iter().sum();
    if total == 0.0 || !total.is_finite() {
        return Err(PolylocError::DegenerateResult(format!(
            "total heritability contribution is {total}; cannot compute %H2"
        )));
    }

    let mut cumulative = 0.0;
    let rows = sizes
        .iter()
        .zip(contributions)
        .map(|(s, contribution)| {
            let share = contribution / total;
            cumulative += share;
            LocalizationRow {
                bin: s.bin,
                size: s.size,
                contribution,
                share,
                cumulative,
            }
        })
        .collect();
    Ok(LocalizationResult { rows, total })
}

pub fn stage_localization(result: &LocalizationResult, path: &Path) -> anyhow::Result<StagedFile> {
    stage_text(path, false, |out| {
        writeln!(out, "BIN\tBIN_SIZE\t%H2\tSUM_%H2")?;
        for row in &result.rows {
            writeln!(
                out,
                "{}\t{}\t{:.5}\t{:.5}",
                row.bin, row.size, row.share, row.cumulative
            )?;
        }
        Ok(())
    })
}
