#![allow(dead_code)]

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use polyloc::error::PolylocError;
use polyloc::paths::{bed_path, bim_path, fam_path};
use polyloc::types::{PosteriorRecord, Variant};

pub fn variant(chr: u8, snp: &str, bp: i64) -> Variant {
    Variant {
        chr,
        snp: snp.to_string(),
        cm: bp as f64 / 1_000_000.0,
        bp,
        a1: "A".to_string(),
        a2: "G".to_string(),
    }
}

pub fn posterior(v: &Variant, beta_mean: f64, beta_sd: f64) -> PosteriorRecord {
    PosteriorRecord {
        snp: v.snp.clone(),
        chr: v.chr.to_string(),
        bp: v.bp,
        a1: v.a1.clone(),
        a2: v.a2.clone(),
        beta_mean,
        beta_sd,
    }
}

/// Writes `.bim/.bed/.fam` for all 22 autosomes and returns the `--bfile-chr` prefix.
/// Chromosomes without variants get an empty `.bim`.
pub fn write_plink(dir: &Path, variants: &[Variant]) -> String {
    let prefix = dir.join("geno.").display().to_string();
    for chr in 1..=22u8 {
        let mut bim = File::create(bim_path(&prefix, chr)).expect("create bim");
        for v in variants.iter().filter(|v| v.chr == chr) {
            writeln!(bim, "{}\t{}\t{}\t{}\t{}\t{}", v.chr, v.snp, v.cm, v.bp, v.a1, v.a2)
                .expect("write bim");
        }
        File::create(bed_path(&prefix, chr)).expect("create bed");
        File::create(fam_path(&prefix, chr)).expect("create fam");
    }
    prefix
}

pub fn write_posterior(path: &Path, rows: &[PosteriorRecord]) {
    let mut file = File::create(path).expect("create posterior");
    writeln!(file, "snp\tchr\tbp\ta1\ta2\tbeta_mean\tbeta_sd").expect("write header");
    for r in rows {
        writeln!(
            file,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            r.snp, r.chr, r.bp, r.a1, r.a2, r.beta_mean, r.beta_sd
        )
        .expect("write row");
    }
}

pub fn write_gz(path: &Path, contents: &str) {
    let file = File::create(path).expect("create gz");
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(contents.as_bytes()).expect("write gz");
    encoder.finish().expect("finish gz");
}

pub fn read_gz(path: &Path) -> String {
    let mut out = String::new();
    GzDecoder::new(File::open(path).expect("open gz"))
        .read_to_string(&mut out)
        .expect("read gz");
    out
}

pub fn read_text(path: &Path) -> String {
    fs::read_to_string(path).expect("read text")
}

pub fn polyloc_error(err: &anyhow::Error) -> &PolylocError {
    err.downcast_ref::<PolylocError>()
        .unwrap_or_else(|| panic!("expected a PolylocError, got {err:#}"))
}
