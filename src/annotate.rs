use std::collections::HashMap;
use std::fs::File;

use anyhow::{Context, Result};

use crate::error::PolylocError;
use crate::io::{BinFile, StagedFile, read_bim, read_bin_file, stage_text};
use crate::logging::log_line;
use crate::paths::{annot_path, bim_path, bins_path, m_path};
use crate::types::{Variant, VariantKey, bin_column_names};

/// Bin membership of one chromosome's genotype variants, in `.bim` order.
#[derive(Debug, Clone)]
pub struct ChromosomeAnnotation {
    pub chr: u8,
    pub variants: Vec<Variant>,
    /// 1-based bin of each variant.
    pub bins: Vec<usize>,
    pub n_bins: usize,
}

impl ChromosomeAnnotation {
    pub fn bin_counts(&self) -> Vec<u64> {
        let mut counts = vec![0u64; self.n_bins];
        for &bin in &self.bins {
            counts[bin - 1] += 1;
        }
        counts
    }
}

/// Aligns a persisted bin file to the genotype variants of the same chromosome.
pub fn annotate_chromosome(
    chr: u8,
    variants: Vec<Variant>,
    bin_file: &BinFile,
) -> crate::error::Result<ChromosomeAnnotation> {
    let mut lookup: HashMap<&VariantKey, usize> = HashMap::with_capacity(bin_file.rows.len());
    for (key, bin) in &bin_file.rows {
        if lookup.insert(key, *bin).is_some() {
            return Err(PolylocError::DataIntegrity(format!(
                "variant {key} appears twice in the bin file of chr {chr}"
            )));
        }
    }

    let mut bins = Vec::with_capacity(variants.len());
    let mut missing = 0usize;
    let mut example = None;
    for variant in &variants {
        let key = variant.key();
        match lookup.get(&key) {
            Some(&bin) => bins.push(bin),
            None => {
                missing += 1;
                example.get_or_insert(key);
            }
        }
    }
    if let Some(example) = example {
        return Err(PolylocError::DataIntegrity(format!(
            "{missing} variants of chr {chr} are not in the bin file (e.g. {example}); \
             the bins were built from different genotype data"
        )));
    }

    Ok(ChromosomeAnnotation {
        chr,
        variants,
        bins,
        n_bins: bin_file.n_bins,
    })
}

/// Stages `<prefix>.<chr>.annot.gz` and `<prefix>.<chr>.l2.M` for one chromosome.
pub fn stage_annotation(
    annotation: &ChromosomeAnnotation,
    output_prefix: &str,
) -> Result<Vec<StagedFile>> {
    let chr = annotation.chr;
    let mut header = vec!["CHR", "BP", "SNP", "CM"]
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>();
    header.extend(bin_column_names(annotation.n_bins));
    let header = header.join("\t");

    let annot = stage_text(&annot_path(output_prefix, chr), true, |out| {
        writeln!(out, "{header}")?;
        for (v, &bin) in annotation.variants.iter().zip(&annotation.bins) {
            write!(out, "{}\t{}\t{}\t{}", v.chr, v.bp, v.snp, v.cm)?;
            for b in 1..=annotation.n_bins {
                out.write_all(if b == bin { b"\t1" } else { b"\t0" })?;
            }
            writeln!(out)?;
        }
        Ok(())
    })
    .with_context(|| format!("write annotation for chr {chr}"))?;

    let counts = annotation
        .bin_counts()
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("\t");
    let m = stage_text(&m_path(output_prefix, chr), false, |out| {
        writeln!(out, "{counts}")?;
        Ok(())
    })
    .with_context(|| format!("write M file for chr {chr}"))?;

    Ok(vec![annot, m])
}

/// Builds and stages the annotation files of every requested chromosome.
///
/// All bin files must agree on the number of bins. Nothing is published here.
pub fn stage_annotations(
    bfile_chr: &str,
    output_prefix: &str,
    chromosomes: &[u8],
    log: &mut File,
) -> Result<Vec<StagedFile>> {
    let mut n_bins: Option<(u8, usize)> = None;
    let mut staged = Vec::new();
    for &chr in chromosomes {
        let variants = read_bim(&bim_path(bfile_chr, chr))?;
        let bin_path = bins_path(output_prefix, chr);
        let bin_file = read_bin_file(&bin_path)
            .with_context(|| format!("read bin file {}", bin_path.display()))?;
        match n_bins {
            Some((first_chr, n)) if n != bin_file.n_bins => {
                return Err(PolylocError::DataIntegrity(format!(
                    "bin file of chr {chr} has {} bins but chr {first_chr} has {n}",
                    bin_file.n_bins
                ))
                .into());
            }
            Some(_) => {}
            None => n_bins = Some((chr, bin_file.n_bins)),
        }

        let annotation = annotate_chromosome(chr, variants, &bin_file)?;
        log_line(
            log,
            &format!(
                "chr {chr}: {} variants annotated with {} bins",
                annotation.variants.len(),
                annotation.n_bins
            ),
            true,
        )?;
        staged.extend(stage_annotation(&annotation, output_prefix)?);
    }
    Ok(staged)
}
