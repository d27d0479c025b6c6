//! Summary statistics shared by the regression and its block jackknife.

use anyhow::Result;
use ndarray::Axis;

use crate::matrix::{Matrix, to_array2};

/// Median chi-square of a 1-df test statistic under the null.
const CHI2_MEDIAN_1DF: f64 = 0.4549;

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn mean_product(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum::<f64>() / a.len() as f64
}

/// `a / b`, or NaN when `b` is zero.
pub(crate) fn ratio_or_nan(a: f64, b: f64) -> f64 {
    if b == 0.0 { f64::NAN } else { a / b }
}

/// Genomic control factor: median chi-square over its null expectation.
pub(crate) fn lambda_gc(chi: &[f64]) -> Option<f64> {
    if chi.is_empty() {
        return None;
    }
    let mut sorted = chi.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };
    Some(median / CHI2_MEDIAN_1DF)
}

/// Pseudo-values `B*full - (B-1)*delete_b`, one row per left-out block.
pub(crate) fn jackknife_pseudo(full: &[f64], delete_values: &[Vec<f64>]) -> Matrix {
    let nb = delete_values.len() as f64;
    delete_values
        .iter()
        .map(|del| {
            full.iter()
                .zip(del)
                .map(|(r, d)| nb * r - (nb - 1.0) * d)
                .collect()
        })
        .collect()
}

/// Jackknife covariance: sample covariance of the pseudo-values over the block count.
pub(crate) fn jackknife_covariance(pseudo: &[Vec<f64>]) -> Result<Matrix> {
    let n = pseudo.len();
    if n < 2 {
        let p = pseudo.first().map(Vec::len).unwrap_or(0);
        return Ok(vec![vec![0.0; p]; p]);
    }
    let values = to_array2(pseudo)?;
    let centred = match values.mean_axis(Axis(0)) {
        Some(means) => &values - &means,
        None => values,
    };
    let scale = ((n - 1) * n) as f64;
    let cov = centred.t().dot(&centred) / scale;
    Ok(cov.outer_iter().map(|row| row.to_vec()).collect())
}

/// Leading `n` by `n` block of a covariance, divided by `factor^2`.
pub(crate) fn rescale_leading(cov: &[Vec<f64>], n: usize, factor: f64) -> Matrix {
    let denom = factor * factor;
    cov.iter()
        .take(n)
        .map(|row| row.iter().take(n).map(|v| v / denom).collect())
        .collect()
}

/// Standard error of `w'x` for a coefficient covariance of `x`.
pub(crate) fn weighted_sum_se(cov: &[Vec<f64>], w: &[f64]) -> f64 {
    let var: f64 = cov
        .iter()
        .zip(w)
        .map(|(row, wi)| wi * row.iter().zip(w).map(|(c, wj)| c * wj).sum::<f64>())
        .sum();
    var.max(0.0).sqrt()
}
