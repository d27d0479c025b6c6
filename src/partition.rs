use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use anyhow::Context;

use crate::cluster::{BinLabels, VarianceClusterer};
use crate::df_utils::{
    required_f64_column, required_i64_column, required_string_column, uppercase_column_names,
};
use crate::error::{PolylocError, Result};
use crate::io::{StagedFile, read_table, stage_text};
use crate::paths::{all_autosomes, bins_path};
use crate::qc::check_equal_length;
use crate::schema::{POSTERIOR_COLUMNS, SNP_COLUMNS, require_columns};
use crate::types::{BinAssignment, BinnedVariant, PosteriorRecord, Variant, VariantKey};

const MISSING_EXAMPLES: usize = 5;

/// Loads posterior effect-size estimates, validating the schema once up front.
///
/// Column names are matched case-insensitively. Every missing required column
/// is reported in a single error.
pub fn load_posterior(path: &Path) -> anyhow::Result<Vec<PosteriorRecord>> {
    let source = path.display().to_string();
    let mut df = read_table(path).with_context(|| format!("read posterior file {source}"))?;
    let headers = uppercase_column_names(&mut df)?;
    require_columns(&headers, &POSTERIOR_COLUMNS, &source)?;
    if df.height() == 0 {
        return Ok(Vec::new());
    }

    let snp = required_string_column(&df, "SNP", &source)?;
    let chr = required_string_column(&df, "CHR", &source)?;
    let bp = required_i64_column(&df, "BP", &source)?;
    let a1 = required_string_column(&df, "A1", &source)?;
    let a2 = required_string_column(&df, "A2", &source)?;
    let beta_mean = required_f64_column(&df, "BETA_MEAN", &source)?;
    let beta_sd = required_f64_column(&df, "BETA_SD", &source)?;

    let records = (0..df.height())
        .map(|i| PosteriorRecord {
            snp: snp[i].clone(),
            chr: chr[i].clone(),
            bp: bp[i],
            a1: a1[i].clone(),
            a2: a2[i].clone(),
            beta_mean: beta_mean[i],
            beta_sd: beta_sd[i],
        })
        .collect();
    Ok(records)
}

/// Bins the posterior variants by effect variance and completes the
/// assignment over the whole genotype universe.
pub fn partition(
    posterior: &[PosteriorRecord],
    universe: &[Variant],
    clusterer: &dyn VarianceClusterer,
) -> Result<BinAssignment> {
    let variances: Vec<f64> = posterior.iter().map(PosteriorRecord::variance).collect();
    let labels = clusterer.cluster(&variances)?;
    assign_bins(posterior, &labels, universe)
}

/// Reconciles clusterer labels for the posterior variants with the genotype universe.
///
/// Every posterior variant must exist in the universe. Universe variants without
/// a posterior estimate are placed, in universe order, into one extra residual
/// bin numbered after the labelled bins. The result lists the posterior rows
/// first, then the residual rows.
pub fn assign_bins(
    posterior: &[PosteriorRecord],
    labels: &BinLabels,
    universe: &[Variant],
) -> Result<BinAssignment> {
    check_equal_length(
        labels.labels.len(),
        posterior.len(),
        "bin labels",
        "posterior variants",
    )?;
    if universe.is_empty() {
        return Err(PolylocError::DataIntegrity(
            "genotype data contain no variants".to_string(),
        ));
    }

    let mut universe_index: HashMap<VariantKey, usize> = HashMap::with_capacity(universe.len());
    for (idx, variant) in universe.iter().enumerate() {
        if let Some(prev) = universe_index.insert(variant.key(), idx) {
            return Err(PolylocError::DataIntegrity(format!(
                "variant {} appears twice in the genotype data (chr {} and chr {})",
                variant.key(),
                universe[prev].chr,
                variant.chr
            )));
        }
    }

    let mut posterior_keys: HashSet<VariantKey> = HashSet::with_capacity(posterior.len());
    let mut in_posterior = vec![false; universe.len()];
    let mut missing: Vec<VariantKey> = Vec::new();
    let mut rows = Vec::with_capacity(universe.len());

    for (record, &label) in posterior.iter().zip(&labels.labels) {
        if label == 0 || label > labels.n_bins {
            return Err(PolylocError::DataIntegrity(format!(
                "bin label {label} for variant {} is outside 1..={}",
                record.key(),
                labels.n_bins
            )));
        }
        let key = record.key();
        if !posterior_keys.insert(key.clone()) {
            return Err(PolylocError::DataIntegrity(format!(
                "variant {key} appears twice in the posterior file"
            )));
        }
        match universe_index.get(&key) {
            Some(&idx) => {
                in_posterior[idx] = true;
                rows.push(BinnedVariant {
                    variant: universe[idx].clone(),
                    bin: label,
                });
            }
            None => missing.push(key),
        }
    }

    if !missing.is_empty() {
        let examples = missing
            .iter()
            .take(MISSING_EXAMPLES)
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(PolylocError::DataIntegrity(format!(
            "found {} variants in the posterior file that are not found in the plink files (e.g. {examples})",
            missing.len()
        )));
    }

    let residual_bin = labels.n_bins + 1;
    let before = rows.len();
    rows.extend(
        universe
            .iter()
            .zip(&in_posterior)
            .filter(|(_, seen)| !**seen)
            .map(|(variant, _)| BinnedVariant {
                variant: variant.clone(),
                bin: residual_bin,
            }),
    );

    let (n_bins, residual_bin) = if rows.len() > before {
        (residual_bin, Some(residual_bin))
    } else {
        (labels.n_bins, None)
    };
    Ok(BinAssignment {
        rows,
        n_bins,
        residual_bin,
    })
}

/// Writes the one-hot bin matrix as one tab-delimited file per autosome.
///
/// Files are only staged; the caller publishes them once the whole stage has
/// succeeded. Rows within a chromosome are ordered by base-pair position.
pub fn stage_bin_files(
    assignment: &BinAssignment,
    output_prefix: &str,
) -> anyhow::Result<Vec<StagedFile>> {
    let mut by_chr: BTreeMap<u8, Vec<&BinnedVariant>> = BTreeMap::new();
    for row in &assignment.rows {
        by_chr.entry(row.variant.chr).or_default().push(row);
    }

    let mut header: Vec<String> = SNP_COLUMNS.iter().map(|s| s.to_string()).collect();
    header.extend(assignment.column_names());
    let header = header.join("\t");

    let mut staged = Vec::new();
    for chr in all_autosomes() {
        let mut rows = by_chr.remove(&chr).unwrap_or_default();
        rows.sort_by_key(|r| r.variant.bp);
        let path = bins_path(output_prefix, chr);
        let file = stage_text(&path, true, |out| {
            writeln!(out, "{header}")?;
            for row in &rows {
                let v = &row.variant;
                write!(out, "{}\t{}\t{}\t{}\t{}", v.chr, v.snp, v.bp, v.a1, v.a2)?;
                for bin in 1..=assignment.n_bins {
                    out.write_all(if bin == row.bin { b"\t1" } else { b"\t0" })?;
                }
                writeln!(out)?;
            }
            Ok(())
        })
        .with_context(|| format!("write bins for chr {chr}"))?;
        staged.push(file);
    }
    Ok(staged)
}
