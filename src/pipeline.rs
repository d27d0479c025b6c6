//! Runs the requested stages in order: partition, ld-score, localize.
//!
//! Each stage stages its output files and publishes them only once the stage
//! has finished, so a failure leaves no partial output for that stage.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, anyhow};

use crate::annotate::stage_annotations;
use crate::binsize::{aggregate, read_bin_sizes, stage_bin_sizes};
use crate::cluster::KMeans1d;
use crate::io::{publish_all, read_universe};
use crate::localize::{localize, stage_localization};
use crate::logging::{log_line, open_run_log, warn_line};
use crate::mode::RunPlan;
use crate::partition::{load_posterior, partition, stage_bin_files};
use crate::paths::{
    all_autosomes, binsize_path, check_inputs, check_ldscore_inputs, plot_path, polyloc_path,
};
use crate::plot_utils::stage_localization_plot;
use crate::qc::check_equal_length;
use crate::regression::{RegressionConfig, fit_taus, load_regression_data};
use crate::types::{BinAssignment, BinSize, LocalizationResult, TauEstimates};

#[derive(Debug, Clone)]
pub struct PartitionOutput {
    pub assignment: BinAssignment,
    pub sizes: Vec<BinSize>,
}

#[derive(Debug, Clone)]
pub struct LocalizeOutput {
    pub estimates: TauEstimates,
    pub result: LocalizationResult,
}

#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    pub partition: Option<PartitionOutput>,
    pub annotation_files: Vec<PathBuf>,
    pub localize: Option<LocalizeOutput>,
}

pub fn run(plan: &RunPlan) -> Result<RunOutput> {
    check_inputs(plan)?;
    let mut log = open_run_log(Path::new(&plan.output_prefix))?;
    let begin = Instant::now();
    log_line(&mut log, "PolyLoc analysis started", true)?;
    for warning in &plan.warnings {
        warn_line(&mut log, warning)?;
    }

    let mut output = RunOutput::default();
    if plan.stages.partition {
        output.partition = Some(run_partition(plan, &mut log)?);
    }
    if plan.stages.ldscore {
        output.annotation_files = run_ldscore(plan, &mut log)?;
    }
    if plan.stages.localize {
        let sizes = output.partition.as_ref().map(|p| p.sizes.as_slice());
        output.localize = Some(run_localize(plan, sizes, &mut log)?);
    }

    log_line(
        &mut log,
        &format!(
            "Analysis finished, running time {:.1}s",
            begin.elapsed().as_secs_f64()
        ),
        true,
    )?;
    Ok(output)
}

fn required<'a, T: ?Sized>(value: Option<&'a T>, flag: &str) -> Result<&'a T> {
    value.ok_or_else(|| anyhow!("{flag} is required by the requested stages"))
}

pub fn run_partition(plan: &RunPlan, log: &mut File) -> Result<PartitionOutput> {
    let posterior_path = required(plan.posterior.as_deref(), "--posterior")?;
    let bfile_chr = required(plan.bfile_chr.as_deref(), "--bfile-chr")?;
    let num_bins = *required(plan.num_bins.as_ref(), "--num-bins")?;

    log_line(
        log,
        &format!("Reading posterior estimates from {}", posterior_path.display()),
        true,
    )?;
    let posterior = load_posterior(posterior_path)?;
    log_line(
        log,
        &format!("Read posterior estimates for {} variants", posterior.len()),
        true,
    )?;

    let universe = read_universe(bfile_chr, &all_autosomes())?;
    log_line(
        log,
        &format!("Read {} variants from {bfile_chr}[1-22].bim", universe.len()),
        true,
    )?;

    let assignment = partition(&posterior, &universe, &KMeans1d::new(num_bins))?;
    let labelled = assignment.residual_bin.map_or(assignment.n_bins, |r| r - 1);
    if labelled < num_bins {
        warn_line(
            log,
            &format!("only {labelled} distinct bins could be formed out of the requested {num_bins}"),
        )?;
    }
    if let Some(residual) = assignment.residual_bin {
        log_line(
            log,
            &format!("Variants without a posterior estimate were placed in bin {residual}"),
            true,
        )?;
    }

    let sizes = aggregate(&assignment)?;
    let mut staged = stage_bin_files(&assignment, &plan.output_prefix)?;
    staged.push(stage_bin_sizes(&sizes, &binsize_path(&plan.output_prefix))?);
    let published = publish_all(staged)?;
    for s in &sizes {
        log_line(log, &format!("bin {}: {} variants", s.bin, s.size), true)?;
    }
    log_line(
        log,
        &format!("Wrote {} bin files and bin sizes", published.len() - 1),
        true,
    )?;

    Ok(PartitionOutput { assignment, sizes })
}

pub fn run_ldscore(plan: &RunPlan, log: &mut File) -> Result<Vec<PathBuf>> {
    let bfile_chr = required(plan.bfile_chr.as_deref(), "--bfile-chr")?;
    if let Some(window) = plan.ld_window {
        log_line(log, &format!("LD window for LD-score estimation: {window}"), true)?;
    }
    if let Some(keep) = &plan.keep {
        log_line(
            log,
            &format!("Individuals to keep for LD-score estimation: {}", keep.display()),
            true,
        )?;
    }

    let staged = stage_annotations(bfile_chr, &plan.output_prefix, &plan.chromosomes, log)?;
    let published = publish_all(staged)?;
    log_line(
        log,
        &format!(
            "Wrote annotation files for {} chromosomes",
            plan.chromosomes.len()
        ),
        true,
    )?;
    Ok(published)
}

/// Uses `sizes` when the partition stage ran in this invocation, else the persisted `.binsize`.
pub fn run_localize(
    plan: &RunPlan,
    sizes: Option<&[BinSize]>,
    log: &mut File,
) -> Result<LocalizeOutput> {
    let sumstats = required(plan.sumstats.as_deref(), "--sumstats")?;
    let w_ld_chr = required(plan.w_ld_chr.as_deref(), "--w-ld-chr")?;
    let sizes = match sizes {
        Some(sizes) => sizes.to_vec(),
        None => {
            let path = binsize_path(&plan.output_prefix);
            read_bin_sizes(&path).with_context(|| format!("read bin sizes {}", path.display()))?
        }
    };
    check_ldscore_inputs(&plan.output_prefix)?;

    let config = RegressionConfig {
        sumstats: sumstats.to_path_buf(),
        ldscore_prefix: plan.output_prefix.clone(),
        w_ld_chr: w_ld_chr.to_string(),
        chromosomes: all_autosomes(),
    };
    let data = load_regression_data(&config, log)?;
    check_equal_length(data.m.len(), sizes.len(), "LD-score bins", "bins in the bin sizes")?;
    let estimates = fit_taus(&data, plan.n_blocks, log)?;

    let result = localize(&estimates.tau, &sizes)?;
    let mut staged = vec![stage_localization(&result, &polyloc_path(&plan.output_prefix))?];
    if plan.plot {
        staged.push(stage_localization_plot(&result, &plot_path(&plan.output_prefix))?);
    }
    let published = publish_all(staged)?;
    log_line(log, "BIN\tBIN_SIZE\t%H2\tSUM_%H2", true)?;
    for row in &result.rows {
        log_line(
            log,
            &format!(
                "{}\t{}\t{:.5}\t{:.5}",
                row.bin, row.size, row.share, row.cumulative
            ),
            true,
        )?;
    }
    for path in &published {
        log_line(log, &format!("Wrote {}", path.display()), true)?;
    }

    Ok(LocalizeOutput { estimates, result })
}
