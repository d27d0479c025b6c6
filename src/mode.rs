//! Stage selection and per-stage parameter validation.
//!
//! The three stages (partition, ld-score, localize) are frequently run as
//! separate jobs, so every combination of flags is checked up front and
//! normalized into a [`RunPlan`] before any file is touched.

use std::path::PathBuf;

use crate::error::{PolylocError, Result};
use crate::paths::{AUTOSOMES, all_autosomes};
use crate::qc::check_positive;
use crate::types::LdWindow;

pub const DEFAULT_LD_WIND_CM: f64 = 1.0;
pub const DEFAULT_N_BLOCKS: usize = 200;

/// Raw invocation parameters, as supplied on the command line.
#[derive(Debug, Clone)]
pub struct PolylocConfig {
    pub compute_partitions: bool,
    pub compute_ldscores: bool,
    pub compute_polyloc: bool,
    pub num_bins: Option<usize>,
    pub chr: Option<u8>,
    pub ld_wind_cm: Option<f64>,
    pub ld_wind_kb: Option<u64>,
    pub ld_wind_snps: Option<u64>,
    pub keep: Option<PathBuf>,
    pub sumstats: Option<PathBuf>,
    pub posterior: Option<PathBuf>,
    pub w_ld_chr: Option<String>,
    pub bfile_chr: Option<String>,
    pub output_prefix: String,
    pub n_blocks: usize,
    pub plot: bool,
}

impl Default for PolylocConfig {
    fn default() -> Self {
        Self {
            compute_partitions: false,
            compute_ldscores: false,
            compute_polyloc: false,
            num_bins: None,
            chr: None,
            ld_wind_cm: None,
            ld_wind_kb: None,
            ld_wind_snps: None,
            keep: None,
            sumstats: None,
            posterior: None,
            w_ld_chr: None,
            bfile_chr: None,
            output_prefix: String::new(),
            n_blocks: DEFAULT_N_BLOCKS,
            plot: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StageSet {
    pub partition: bool,
    pub ldscore: bool,
    pub localize: bool,
}

impl StageSet {
    pub fn any(&self) -> bool {
        self.partition || self.ldscore || self.localize
    }

    pub fn only_ldscore(&self) -> bool {
        self.ldscore && !self.partition && !self.localize
    }
}

/// Validated parameters of one invocation.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub stages: StageSet,
    pub output_prefix: String,
    pub bfile_chr: Option<String>,
    pub posterior: Option<PathBuf>,
    pub sumstats: Option<PathBuf>,
    pub w_ld_chr: Option<String>,
    pub keep: Option<PathBuf>,
    /// Chromosomes processed by the ld-score stage.
    pub chromosomes: Vec<u8>,
    pub ld_window: Option<LdWindow>,
    pub num_bins: Option<usize>,
    pub n_blocks: usize,
    pub plot: bool,
    pub warnings: Vec<String>,
}

fn config_error(msg: impl Into<String>) -> PolylocError {
    PolylocError::Configuration(msg.into())
}

pub fn validate(config: &PolylocConfig) -> Result<RunPlan> {
    let stages = StageSet {
        partition: config.compute_partitions,
        ldscore: config.compute_ldscores,
        localize: config.compute_polyloc,
    };
    let mut warnings = Vec::new();

    if !stages.any() {
        return Err(config_error(
            "must specify at least one of --compute-partitions, --compute-ldscores, --compute-polyloc",
        ));
    }
    if stages.partition && stages.localize && !stages.ldscore {
        return Err(config_error(
            "cannot use both --compute-partitions and --compute-polyloc without also specifying --compute-ldscores",
        ));
    }
    if stages.ldscore && stages.localize && !stages.partition {
        return Err(config_error(
            "cannot use both --compute-ldscores and --compute-polyloc without also specifying --compute-partitions",
        ));
    }
    if config.output_prefix.trim().is_empty() {
        return Err(config_error("--output-prefix must not be empty"));
    }

    if let Some(chr) = config.chr {
        if !stages.only_ldscore() {
            return Err(config_error(
                "--chr can only be specified when using only --compute-ldscores",
            ));
        }
        if !AUTOSOMES.contains(&chr) {
            return Err(config_error(format!(
                "--chr must be an autosome between 1 and 22, got {chr}"
            )));
        }
    }

    let needs_plink = stages.partition || stages.ldscore;
    match (&config.bfile_chr, needs_plink) {
        (None, true) => {
            return Err(config_error(
                "--bfile-chr must be specified when using --compute-partitions or --compute-ldscores",
            ));
        }
        (Some(_), false) => {
            return Err(config_error(
                "--bfile-chr can only be specified when using --compute-partitions or --compute-ldscores",
            ));
        }
        _ => {}
    }

    match (&config.posterior, stages.partition) {
        (None, true) => {
            return Err(config_error(
                "--posterior must be specified when using --compute-partitions",
            ));
        }
        (Some(_), false) => {
            return Err(config_error(
                "--posterior can only be specified together with --compute-partitions",
            ));
        }
        _ => {}
    }

    match (config.num_bins, stages.partition) {
        (None, true) => {
            return Err(config_error(
                "--num-bins must be specified when using --compute-partitions",
            ));
        }
        (Some(0), true) => return Err(config_error("--num-bins must be at least 1")),
        (Some(_), false) => {
            return Err(config_error(
                "--num-bins can only be specified together with --compute-partitions",
            ));
        }
        _ => {}
    }

    match (&config.sumstats, stages.localize) {
        (None, true) => {
            return Err(config_error(
                "--sumstats must be specified when using --compute-polyloc",
            ));
        }
        (Some(_), false) => {
            return Err(config_error(
                "--sumstats can only be specified together with --compute-polyloc",
            ));
        }
        _ => {}
    }
    if stages.localize && config.w_ld_chr.is_none() {
        return Err(config_error(
            "--w-ld-chr must be specified when using --compute-polyloc",
        ));
    }
    if config.n_blocks < 2 {
        return Err(config_error(format!(
            "--n-blocks must be at least 2, got {}",
            config.n_blocks
        )));
    }

    let ld_window = resolve_ld_window(config, stages, &mut warnings)?;

    if !stages.ldscore && config.keep.is_some() {
        return Err(config_error(
            "--keep can only be specified together with --compute-ldscores",
        ));
    }

    let chromosomes = match config.chr {
        Some(chr) => vec![chr],
        None => all_autosomes(),
    };

    Ok(RunPlan {
        stages,
        output_prefix: config.output_prefix.clone(),
        bfile_chr: config.bfile_chr.clone(),
        posterior: config.posterior.clone(),
        sumstats: config.sumstats.clone(),
        w_ld_chr: config.w_ld_chr.clone(),
        keep: config.keep.clone(),
        chromosomes,
        ld_window,
        num_bins: config.num_bins,
        n_blocks: config.n_blocks,
        plot: config.plot,
        warnings,
    })
}

fn resolve_ld_window(
    config: &PolylocConfig,
    stages: StageSet,
    warnings: &mut Vec<String>,
) -> Result<Option<LdWindow>> {
    let mut given = Vec::new();
    if let Some(cm) = config.ld_wind_cm {
        check_positive(cm, "--ld-wind-cm")?;
        given.push(LdWindow::Centimorgans(cm));
    }
    if let Some(kb) = config.ld_wind_kb {
        if kb == 0 {
            return Err(config_error("--ld-wind-kb must be positive"));
        }
        given.push(LdWindow::Kilobases(kb));
    }
    if let Some(snps) = config.ld_wind_snps {
        if snps == 0 {
            return Err(config_error("--ld-wind-snps must be positive"));
        }
        given.push(LdWindow::Snps(snps));
    }

    if !stages.ldscore {
        if !given.is_empty() {
            return Err(config_error(
                "--ld-wind parameters can only be specified together with --compute-ldscores",
            ));
        }
        return Ok(None);
    }

    match given.len() {
        0 => {
            warnings.push(format!(
                "no ld-wind argument specified. PolyLoc will use --ld-wind-cm {DEFAULT_LD_WIND_CM}"
            ));
            Ok(Some(LdWindow::Centimorgans(DEFAULT_LD_WIND_CM)))
        }
        1 => Ok(given.pop()),
        _ => Err(config_error(
            "only one of --ld-wind-cm, --ld-wind-kb, --ld-wind-snps may be specified",
        )),
    }
}
