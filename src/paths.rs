use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::mode::RunPlan;
use crate::qc::{check_dir_exists, check_file_exists};

pub const AUTOSOMES: std::ops::RangeInclusive<u8> = 1..=22;

pub fn all_autosomes() -> Vec<u8> {
    AUTOSOMES.collect()
}

fn with_suffix(prefix: &str, suffix: &str) -> PathBuf {
    PathBuf::from(format!("{prefix}{suffix}"))
}

pub fn bim_path(bfile_chr: &str, chr: u8) -> PathBuf {
    with_suffix(bfile_chr, &format!("{chr}.bim"))
}

pub fn bed_path(bfile_chr: &str, chr: u8) -> PathBuf {
    with_suffix(bfile_chr, &format!("{chr}.bed"))
}

pub fn fam_path(bfile_chr: &str, chr: u8) -> PathBuf {
    with_suffix(bfile_chr, &format!("{chr}.fam"))
}

pub fn weights_path(w_ld_chr: &str, chr: u8) -> PathBuf {
    with_suffix(w_ld_chr, &format!("{chr}.l2.ldscore.gz"))
}

pub fn bins_path(output_prefix: &str, chr: u8) -> PathBuf {
    with_suffix(output_prefix, &format!(".{chr}.bins.gz"))
}

pub fn annot_path(output_prefix: &str, chr: u8) -> PathBuf {
    with_suffix(output_prefix, &format!(".{chr}.annot.gz"))
}

pub fn ldscore_path(output_prefix: &str, chr: u8) -> PathBuf {
    with_suffix(output_prefix, &format!(".{chr}.l2.ldscore.gz"))
}

pub fn m_path(output_prefix: &str, chr: u8) -> PathBuf {
    with_suffix(output_prefix, &format!(".{chr}.l2.M"))
}

pub fn m_5_50_path(output_prefix: &str, chr: u8) -> PathBuf {
    with_suffix(output_prefix, &format!(".{chr}.l2.M_5_50"))
}

pub fn binsize_path(output_prefix: &str) -> PathBuf {
    with_suffix(output_prefix, ".binsize")
}

pub fn polyloc_path(output_prefix: &str) -> PathBuf {
    with_suffix(output_prefix, ".polyloc")
}

pub fn plot_path(output_prefix: &str) -> PathBuf {
    with_suffix(output_prefix, ".polyloc.html")
}

fn check_plink_files(bfile_chr: &str, chr: u8) -> Result<()> {
    check_file_exists(&bim_path(bfile_chr, chr), "--bfile-chr")?;
    check_file_exists(&fam_path(bfile_chr, chr), "--bfile-chr")?;
    check_file_exists(&bed_path(bfile_chr, chr), "--bfile-chr")
}

/// Verifies, before any stage runs, that every input the planned stages need is on disk.
///
/// Files produced by an earlier stage of the same invocation are not required
/// up front. LD-score files are produced outside this program and are checked
/// when the localize stage starts (see [`check_ldscore_inputs`]).
pub fn check_inputs(plan: &RunPlan) -> Result<()> {
    let prefix = plan.output_prefix.as_str();
    if let Some(parent) = Path::new(prefix).parent()
        && !parent.as_os_str().is_empty()
    {
        check_dir_exists(parent, "output")?;
    }

    if plan.stages.partition {
        if let Some(posterior) = &plan.posterior {
            check_file_exists(posterior, "--posterior")?;
        }
        if let Some(bfile) = &plan.bfile_chr {
            for chr in AUTOSOMES {
                check_plink_files(bfile, chr)?;
            }
        }
    }

    if plan.stages.ldscore {
        if let Some(bfile) = &plan.bfile_chr {
            for &chr in &plan.chromosomes {
                check_plink_files(bfile, chr)?;
                if !plan.stages.partition {
                    check_file_exists(&bins_path(prefix, chr), "--compute-ldscores")?;
                }
            }
        }
        if let Some(keep) = &plan.keep {
            check_file_exists(keep, "--keep")?;
        }
    }

    if plan.stages.localize {
        if let Some(sumstats) = &plan.sumstats {
            check_file_exists(sumstats, "--sumstats")?;
        }
        if let Some(w_ld) = &plan.w_ld_chr {
            for chr in AUTOSOMES {
                check_file_exists(&weights_path(w_ld, chr), "--w-ld-chr")?;
            }
        }
        if !plan.stages.partition {
            check_file_exists(&binsize_path(prefix), "--compute-polyloc")?;
        }
    }
    Ok(())
}

/// LD-scores and annotation sizes of the bins, for every autosome.
pub fn check_ldscore_inputs(output_prefix: &str) -> Result<()> {
    for chr in AUTOSOMES {
        check_file_exists(&ldscore_path(output_prefix, chr), "--compute-polyloc")?;
        if !m_5_50_path(output_prefix, chr).exists() {
            check_file_exists(&m_path(output_prefix, chr), "--compute-polyloc")?;
        }
    }
    Ok(())
}
