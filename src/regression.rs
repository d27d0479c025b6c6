//! Single-trait stratified LD-score regression over the bin annotations.
//!
//! The chi-square statistics are regressed on the N-scaled per-bin LD-scores
//! plus an intercept. Cross products are accumulated per contiguous block so
//! that every leave-one-block-out fit reuses them. Per-bin coefficients are
//! kept non-negative; the intercept is free.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use polars::prelude::*;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::df_utils::{
    drop_cols_if_present, optional_f64_column, rename_last_column, uppercase_column_names,
};
use crate::error::PolylocError;
use crate::io::{read_m_values, read_table};
use crate::logging::{log_line, warn_line};
use crate::matrix::{Matrix, mat_vec_mul, principal_submatrix, solve_linear};
use crate::paths::{ldscore_path, m_5_50_path, m_path, weights_path};
use crate::schema::{SUMSTATS_COLUMNS, require_columns};
use crate::stats::{
    jackknife_covariance, jackknife_pseudo, lambda_gc, mean, mean_product, ratio_or_nan,
    rescale_leading, weighted_sum_se,
};
use crate::types::TauEstimates;

const MAX_ACTIVE_SET_ITER_FACTOR: usize = 3;

#[derive(Debug, Clone)]
pub struct RegressionConfig {
    pub sumstats: std::path::PathBuf,
    /// Prefix of the bin LD-score and `M` files.
    pub ldscore_prefix: String,
    pub w_ld_chr: String,
    pub chromosomes: Vec<u8>,
}

/// Merged regression inputs, one entry per retained SNP.
#[derive(Debug, Clone)]
pub struct RegressionData {
    pub bin_columns: Vec<String>,
    pub ld_cols: Vec<Vec<f64>>,
    pub chi: Vec<f64>,
    pub n: Vec<f64>,
    pub wld: Vec<f64>,
    pub m: Vec<f64>,
}

pub fn load_regression_data(config: &RegressionConfig, log: &mut File) -> Result<RegressionData> {
    log_line(
        log,
        &format!(
            "Reading LD scores from {}.[{}-{}].l2.ldscore.gz",
            config.ldscore_prefix,
            config.chromosomes.first().copied().unwrap_or(1),
            config.chromosomes.last().copied().unwrap_or(22)
        ),
        true,
    )?;
    let (x, bin_columns) = read_bin_ldscores(&config.ldscore_prefix, &config.chromosomes)?;
    let m = read_bin_m(&config.ldscore_prefix, &config.chromosomes)?;
    if m.len() != bin_columns.len() {
        return Err(PolylocError::ShapeMismatch(format!(
            "number of annotations in M files ({}) does not match LD score columns ({})",
            m.len(),
            bin_columns.len()
        ))
        .into());
    }
    log_line(
        log,
        &format!(
            "LD scores contain {} SNPs and {} bins",
            x.height(),
            bin_columns.len()
        ),
        true,
    )?;

    log_line(
        log,
        &format!("Reading weighted LD scores from {}[1-22]", config.w_ld_chr),
        true,
    )?;
    let w = read_weights(&config.w_ld_chr, &config.chromosomes)?;

    let merged = read_sumstats_for_regression(&config.sumstats, &w, &x, log)?;
    let n = non_null_f64(&merged, "N")?;
    let z = non_null_f64(&merged, "Z")?;
    let wld = non_null_f64(&merged, "wLD")?;
    let ld_cols = bin_columns
        .iter()
        .map(|name| non_null_f64(&merged, name))
        .collect::<Result<Vec<_>>>()?;
    let chi = z.iter().map(|v| v * v).collect();

    Ok(RegressionData {
        bin_columns,
        ld_cols,
        chi,
        n,
        wld,
        m,
    })
}

fn read_bin_ldscores(prefix: &str, chromosomes: &[u8]) -> Result<(DataFrame, Vec<String>)> {
    let mut stacked: Option<DataFrame> = None;
    let mut columns: Option<Vec<String>> = None;
    for &chr in chromosomes {
        let path = ldscore_path(prefix, chr);
        let mut df = read_table(&path)?;
        uppercase_column_names(&mut df)?;
        drop_cols_if_present(&mut df, &["CM", "MAF"])?;
        let source = path.display().to_string();
        let headers: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        require_columns(&headers, &["CHR", "SNP", "BP"], &source)?;
        let bins = annotation_columns(&headers);
        if bins.is_empty() {
            return Err(PolylocError::DataIntegrity(format!("{source} has no LD-score columns")).into());
        }
        match &columns {
            Some(existing) if *existing != bins => {
                return Err(PolylocError::DataIntegrity(format!(
                    "{source} has LD-score columns {} but earlier chromosomes have {}",
                    bins.join(" "),
                    existing.join(" ")
                ))
                .into());
            }
            Some(_) => {}
            None => columns = Some(bins.clone()),
        }
        let typed = typed_frame(&df, &["SNP"], &["CHR", "BP"], &bins)
            .with_context(|| format!("read {source}"))?;
        match stacked.as_mut() {
            Some(out) => {
                out.vstack_mut(&typed)?;
            }
            None => stacked = Some(typed),
        }
    }
    let x = stacked.ok_or_else(|| anyhow::anyhow!("no chromosomes to read LD scores for"))?;
    Ok((x, columns.unwrap_or_default()))
}

fn annotation_columns(headers: &[String]) -> Vec<String> {
    headers
        .iter()
        .filter(|name| !matches!(name.as_str(), "CHR" | "BP" | "SNP"))
        .cloned()
        .collect()
}

fn read_bin_m(prefix: &str, chromosomes: &[u8]) -> Result<Vec<f64>> {
    let mut sums: Vec<f64> = Vec::new();
    for &chr in chromosomes {
        let preferred = m_5_50_path(prefix, chr);
        let path = if preferred.exists() {
            preferred
        } else {
            m_path(prefix, chr)
        };
        let values = read_m_values(&path)?;
        if sums.is_empty() {
            sums = values;
        } else if values.len() != sums.len() {
            return Err(PolylocError::DataIntegrity(format!(
                "M column count mismatch in {}",
                path.display()
            ))
            .into());
        } else {
            for (s, v) in sums.iter_mut().zip(&values) {
                *s += v;
            }
        }
    }
    Ok(sums)
}

fn read_weights(w_ld_chr: &str, chromosomes: &[u8]) -> Result<DataFrame> {
    let mut stacked: Option<DataFrame> = None;
    for &chr in chromosomes {
        let path = weights_path(w_ld_chr, chr);
        let mut w = read_table(&path)?;
        uppercase_column_names(&mut w)?;
        drop_cols_if_present(&mut w, &["CM", "MAF", "CHR", "BP"])?;
        rename_last_column(&mut w, "wLD")?;
        let typed = typed_frame(&w, &["SNP"], &[], &["wLD".to_string()])
            .with_context(|| format!("read {}", path.display()))?;
        match stacked.as_mut() {
            Some(out) => {
                out.vstack_mut(&typed)?;
            }
            None => stacked = Some(typed),
        }
    }
    stacked.ok_or_else(|| anyhow::anyhow!("no chromosomes to read weights for"))
}

/// Rebuilds a frame with fixed column types so that per-chromosome files can be stacked.
fn typed_frame(
    df: &DataFrame,
    string_cols: &[&str],
    int_cols: &[&str],
    float_cols: &[String],
) -> Result<DataFrame> {
    let mut cols = Vec::with_capacity(string_cols.len() + int_cols.len() + float_cols.len());
    for name in string_cols {
        cols.push(df.column(name)?.cast(&DataType::String)?);
    }
    for name in int_cols {
        cols.push(df.column(name)?.cast(&DataType::Int64)?);
    }
    for name in float_cols {
        cols.push(df.column(name)?.cast(&DataType::Float64)?);
    }
    Ok(DataFrame::new(cols)?)
}

fn read_sumstats_for_regression(
    path: &Path,
    w: &DataFrame,
    x: &DataFrame,
    log: &mut File,
) -> Result<DataFrame> {
    let source = path.display().to_string();
    let mut y = read_table(path).with_context(|| format!("read summary statistics {source}"))?;
    let headers = uppercase_column_names(&mut y)?;
    require_columns(&headers, &SUMSTATS_COLUMNS, &source)?;
    let y = typed_frame(&y, &["SNP"], &[], &["Z".to_string(), "N".to_string()])?;
    let y = y.drop_nulls::<String>(None)?;
    log_line(
        log,
        &format!("Read in summary statistics for {} SNPs from {source}", y.height()),
        true,
    )?;

    let merged = y.join(w, ["SNP"], ["SNP"], JoinType::Inner.into(), None)?;
    let merged = merged.join(x, ["SNP"], ["SNP"], JoinType::Inner.into(), None)?;
    let merged = merged.sort(["CHR", "BP"], Default::default())?;
    log_line(
        log,
        &format!(
            "Out of {} SNPs, {} remain after merging with LD-score files",
            y.height(),
            merged.height()
        ),
        true,
    )?;

    let n = non_null_f64(&merged, "N")?;
    let z = non_null_f64(&merged, "Z")?;
    let chisq_max = (0.001 * n.iter().cloned().fold(0.0, f64::max)).max(80.0);
    let mask_values: Vec<bool> = z
        .iter()
        .map(|v| {
            let chi = v * v;
            chi.is_finite() && chi <= chisq_max
        })
        .collect();
    let removed = mask_values.iter().filter(|keep| !**keep).count();
    let mask = BooleanChunked::new("mask".into(), mask_values);
    let merged = merged.filter(&mask)?;
    log_line(
        log,
        &format!(
            "Removing {removed} SNPs with Chi^2 > {chisq_max}; {} remain",
            merged.height()
        ),
        true,
    )?;
    Ok(merged)
}

fn non_null_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    Ok(optional_f64_column(df, name)?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

/// Fits the regression and its block jackknife on already merged inputs.
pub fn fit_taus(data: &RegressionData, n_blocks: usize, log: &mut File) -> Result<TauEstimates> {
    let n_snps = data.chi.len();
    let n_annot = data.ld_cols.len();
    if n_annot == 0 {
        return Err(PolylocError::DataIntegrity("no bin LD-scores to regress on".to_string()).into());
    }
    if n_snps < n_blocks {
        return Err(PolylocError::DataIntegrity(format!(
            "only {n_snps} SNPs remain after merging, fewer than the {n_blocks} jackknife blocks"
        ))
        .into());
    }
    if data.m.len() != n_annot {
        return Err(PolylocError::ShapeMismatch(format!(
            "number of M values ({}) does not match number of bins ({n_annot})",
            data.m.len()
        ))
        .into());
    }

    let m_tot: f64 = data.m.iter().sum();
    let x_tot = row_sums(&data.ld_cols);
    let (init_w, _tot_agg) = compute_initial_weights(&data.chi, &data.n, &x_tot, &data.wld, m_tot);
    let weights = normalize_weights(&init_w);
    let n_bar = mean(&data.n);

    let (reg, delete_values) = weighted_regression_blocks(
        &data.ld_cols,
        &data.chi,
        &weights,
        n_blocks,
        Some((data.n.as_slice(), n_bar)),
    )?;

    let intercept = reg[n_annot];
    let tau: Vec<f64> = reg[..n_annot].iter().map(|v| v / n_bar).collect();
    let h2: f64 = tau.iter().zip(&data.m).map(|(t, m)| t * m).sum();

    let pseudo = jackknife_pseudo(&reg, &delete_values);
    let jack_cov = jackknife_covariance(&pseudo)?;
    let intercept_se = jack_cov[n_annot][n_annot].max(0.0).sqrt();
    let coef_cov = rescale_leading(&jack_cov, n_annot, n_bar);
    let tau_se: Vec<f64> = (0..n_annot).map(|i| coef_cov[i][i].max(0.0).sqrt()).collect();
    let h2_se = weighted_sum_se(&coef_cov, &data.m);

    let mean_chi = mean(&data.chi);
    log_line(log, &format!("Mean Chi^2: {mean_chi:.4}"), true)?;
    if let Some(lambda) = lambda_gc(&data.chi) {
        log_line(log, &format!("Lambda GC: {lambda:.4}"), true)?;
    }
    log_line(
        log,
        &format!("Intercept: {intercept:.4} ({intercept_se:.4})"),
        true,
    )?;
    let ratio = ratio_or_nan(intercept - 1.0, mean_chi - 1.0);
    let ratio_se = ratio_or_nan(intercept_se, mean_chi - 1.0);
    if ratio.is_finite() && ratio_se.is_finite() {
        log_line(log, &format!("Ratio: {ratio:.4} ({ratio_se:.4})"), true)?;
    }
    log_line(
        log,
        &format!("Total Observed Scale h2: {h2:.4} ({h2_se:.4})"),
        true,
    )?;
    if h2 < 0.0 {
        warn_line(log, "total observed scale h2 is negative")?;
    }

    let normal = Normal::new(0.0, 1.0).context("normal distribution")?;
    for (i, name) in data.bin_columns.iter().enumerate() {
        let z = ratio_or_nan(tau[i], tau_se[i]);
        let p = if z.is_finite() {
            2.0 * (1.0 - normal.cdf(z.abs()))
        } else {
            f64::NAN
        };
        log_line(
            log,
            &format!(
                "{name}: tau {:.4e} (se {:.4e}, z {z:.3}, p {p:.3e})",
                tau[i], tau_se[i]
            ),
            true,
        )?;
    }

    Ok(TauEstimates {
        tau,
        tau_se,
        intercept,
        intercept_se,
        n_bar,
        h2,
        h2_se,
        n_snps,
    })
}

fn row_sums(cols: &[Vec<f64>]) -> Vec<f64> {
    let rows = cols.first().map(Vec::len).unwrap_or(0);
    let mut sums = vec![0.0; rows];
    for col in cols {
        for (s, v) in sums.iter_mut().zip(col) {
            *s += v;
        }
    }
    sums
}

/// Heteroscedasticity and overcounting weights, returned as square roots.
fn compute_initial_weights(
    chi: &[f64],
    n: &[f64],
    x_tot: &[f64],
    wld: &[f64],
    m_tot: f64,
) -> (Vec<f64>, f64) {
    let mean_xn = mean_product(x_tot, n);
    let tot_agg = if mean_xn != 0.0 {
        m_tot * (mean(chi) - 1.0) / mean_xn
    } else {
        0.0
    }
    .clamp(0.0, 1.0);

    let init = (0..chi.len())
        .map(|i| {
            let ld = x_tot[i].max(1.0);
            let w_ld = wld[i].max(1.0);
            let c = tot_agg * n[i] / m_tot;
            let het_w = 1.0 / (2.0 * (1.0 + c * ld).powi(2));
            (het_w / w_ld).sqrt()
        })
        .collect();
    (init, tot_agg)
}

fn normalize_weights(init: &[f64]) -> Vec<f64> {
    let sum: f64 = init.iter().sum();
    if sum == 0.0 {
        return vec![0.0; init.len()];
    }
    init.iter().map(|v| v / sum).collect()
}

/// Returns the full-data coefficients and one leave-one-block-out fit per block.
/// The intercept is the last coefficient.
fn weighted_regression_blocks(
    ld_cols: &[Vec<f64>],
    y: &[f64],
    weights: &[f64],
    n_blocks: usize,
    scale: Option<(&[f64], f64)>,
) -> Result<(Vec<f64>, Vec<Vec<f64>>)> {
    let n = y.len();
    let n_annot = ld_cols.len();
    let p = n_annot + 1;
    let mut xty_blocks = vec![vec![0.0; p]; n_blocks];
    let mut xtx_blocks = vec![vec![vec![0.0; p]; p]; n_blocks];

    let mut x_vals = vec![0.0; p];
    for row in 0..n {
        let block = row * n_blocks / n.max(1);
        let weight_sq = weights[row] * weights[row];
        for (j, col) in ld_cols.iter().enumerate() {
            x_vals[j] = match scale {
                Some((n_vec, n_bar)) => col[row] * n_vec[row] / n_bar,
                None => col[row],
            };
        }
        x_vals[p - 1] = 1.0;

        for i in 0..p {
            xty_blocks[block][i] += x_vals[i] * y[row] * weight_sq;
            for j in 0..p {
                xtx_blocks[block][i][j] += x_vals[i] * x_vals[j] * weight_sq;
            }
        }
    }

    let mut xty = vec![0.0; p];
    let mut xtx = vec![vec![0.0; p]; p];
    for b in 0..n_blocks {
        for i in 0..p {
            xty[i] += xty_blocks[b][i];
            for j in 0..p {
                xtx[i][j] += xtx_blocks[b][i][j];
            }
        }
    }

    let reg = solve_nonnegative(&xtx, &xty, n_annot)?;

    let mut delete_values = Vec::with_capacity(n_blocks);
    for b in 0..n_blocks {
        let xty_del: Vec<f64> = xty.iter().zip(&xty_blocks[b]).map(|(a, d)| a - d).collect();
        let xtx_del: Matrix = xtx
            .iter()
            .zip(&xtx_blocks[b])
            .map(|(row, del)| row.iter().zip(del).map(|(a, d)| a - d).collect())
            .collect();
        delete_values.push(
            solve_nonnegative(&xtx_del, &xty_del, n_annot)
                .with_context(|| format!("jackknife block {}", b + 1))?,
        );
    }

    Ok((reg, delete_values))
}

/// Minimizes `x'Ax/2 - b'x` with `x[..n_constrained] >= 0` (Lawson-Hanson active set).
///
/// `A` is symmetric positive definite (the normal equations). Variables at
/// index `n_constrained` and above are unconstrained and always in the
/// passive set.
fn solve_nonnegative(
    xtx: &[Vec<f64>],
    xty: &[f64],
    n_constrained: usize,
) -> Result<Vec<f64>> {
    let p = xty.len();
    let scale = xty.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())).max(1.0);
    let tol = 1e-12 * scale;

    let mut passive: Vec<bool> = (0..p).map(|i| i >= n_constrained).collect();
    let mut x = solve_passive(xtx, xty, &passive)?;

    for _ in 0..MAX_ACTIVE_SET_ITER_FACTOR * p.max(1) {
        let grad: Vec<f64> = xty
            .iter()
            .zip(mat_vec_mul(xtx, &x))
            .map(|(b, ax)| b - ax)
            .collect();
        let candidate = (0..n_constrained)
            .filter(|&j| !passive[j] && grad[j] > tol)
            .max_by(|&a, &b| grad[a].total_cmp(&grad[b]));
        let Some(entering) = candidate else {
            return Ok(x);
        };
        passive[entering] = true;

        loop {
            let s = solve_passive(xtx, xty, &passive)?;
            let blocking: Vec<usize> = (0..n_constrained)
                .filter(|&i| passive[i] && s[i] <= 0.0)
                .collect();
            if blocking.is_empty() {
                x = s;
                break;
            }
            let alpha = blocking
                .iter()
                .map(|&i| {
                    let step = x[i] - s[i];
                    if step > 0.0 { x[i] / step } else { 0.0 }
                })
                .fold(1.0_f64, f64::min);
            for i in 0..p {
                x[i] += alpha * (s[i] - x[i]);
            }
            for i in 0..n_constrained {
                if passive[i] && x[i] <= tol {
                    passive[i] = false;
                    x[i] = 0.0;
                }
            }
        }
    }
    Err(PolylocError::DegenerateResult(
        "non-negative regression did not converge".to_string(),
    )
    .into())
}

/// Solves the normal equations restricted to the passive variables; the others are zero.
fn solve_passive(xtx: &[Vec<f64>], xty: &[f64], passive: &[bool]) -> Result<Vec<f64>> {
    let idx: Vec<usize> = (0..xty.len()).filter(|&i| passive[i]).collect();
    let mut x = vec![0.0; xty.len()];
    if idx.is_empty() {
        return Ok(x);
    }
    let a = principal_submatrix(xtx, &idx);
    let b: Vec<f64> = idx.iter().map(|&i| xty[i]).collect();
    for (&i, v) in idx.iter().zip(solve_linear(&a, &b)?) {
        x[i] = v;
    }
    Ok(x)
}
