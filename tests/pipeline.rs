mod common;

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use approx::assert_relative_eq;
use tempfile::tempdir;

use common::{polyloc_error, posterior, read_gz, read_text, variant, write_gz, write_plink, write_posterior};
use polyloc::error::PolylocError;
use polyloc::mode::{PolylocConfig, validate};
use polyloc::paths::{
    annot_path, bins_path, binsize_path, ldscore_path, m_path, plot_path, polyloc_path,
    weights_path,
};
use polyloc::pipeline::run;
use polyloc::types::Variant;

const SNPS_PER_CHR: usize = 12;
const N: f64 = 10_000.0;

fn universe() -> Vec<Variant> {
    (1..=22u8)
        .flat_map(|chr| {
            (0..3).map(move |i| variant(chr, &format!("rs{chr}_{i}"), 1000 * (i as i64 + 1)))
        })
        .collect()
}

fn partition_config(dir: &Path, posterior_path: PathBuf, bfile: String) -> PolylocConfig {
    PolylocConfig {
        compute_partitions: true,
        num_bins: Some(2),
        posterior: Some(posterior_path),
        bfile_chr: Some(bfile),
        output_prefix: dir.join("run").display().to_string(),
        ..Default::default()
    }
}

#[test]
fn partition_stage_publishes_bins_and_sizes() {
    let dir = tempdir().expect("tempdir");
    let u = universe();
    let bfile = write_plink(dir.path(), &u);
    let post: Vec<_> = u
        .iter()
        .take(10)
        .enumerate()
        .map(|(i, v)| posterior(v, if i < 3 { 1.0 } else { 0.01 }, 0.0))
        .collect();
    let posterior_path = dir.path().join("posterior.txt");
    write_posterior(&posterior_path, &post);

    let plan = validate(&partition_config(dir.path(), posterior_path, bfile)).expect("plan");
    let output = run(&plan).expect("run");

    let part = output.partition.expect("partition output");
    assert_eq!(part.assignment.n_bins, 3);
    assert_eq!(part.assignment.residual_bin, Some(3));
    let sizes: Vec<u64> = part.sizes.iter().map(|s| s.size).collect();
    assert_eq!(sizes, vec![3, 7, 56]);

    let prefix = plan.output_prefix.as_str();
    assert_eq!(
        read_text(&binsize_path(prefix)),
        "BIN\tBIN_SIZE\n1\t3\n2\t7\n3\t56\n"
    );
    for chr in 1..=22u8 {
        assert!(bins_path(prefix, chr).exists(), "bins for chr {chr}");
    }
    assert!(Path::new(&format!("{prefix}.log")).exists());
}

#[test]
fn partition_failure_publishes_nothing() {
    let dir = tempdir().expect("tempdir");
    let u = universe();
    let bfile = write_plink(dir.path(), &u);
    let mut post = vec![posterior(&u[0], 0.5, 0.1)];
    post.push(posterior(&variant(5, "not_genotyped", 42), 0.2, 0.1));
    let posterior_path = dir.path().join("posterior.txt");
    write_posterior(&posterior_path, &post);

    let plan = validate(&partition_config(dir.path(), posterior_path, bfile)).expect("plan");
    let err = run(&plan).unwrap_err();
    assert!(matches!(polyloc_error(&err), PolylocError::DataIntegrity(_)));

    let prefix = plan.output_prefix.as_str();
    assert!(!binsize_path(prefix).exists());
    for chr in 1..=22u8 {
        assert!(!bins_path(prefix, chr).exists());
    }
}

#[test]
fn missing_plink_file_fails_before_any_work() {
    let dir = tempdir().expect("tempdir");
    let u = universe();
    let bfile = write_plink(dir.path(), &u);
    std::fs::remove_file(format!("{bfile}7.fam")).expect("remove fam");
    let posterior_path = dir.path().join("posterior.txt");
    write_posterior(&posterior_path, &[posterior(&u[0], 0.5, 0.1)]);

    let plan = validate(&partition_config(dir.path(), posterior_path, bfile)).expect("plan");
    let err = run(&plan).unwrap_err();
    match polyloc_error(&err) {
        PolylocError::MissingFile(msg) => assert!(msg.contains("7.fam"), "{msg}"),
        other => panic!("expected missing file error, got {other:?}"),
    }
    assert!(!Path::new(&format!("{}.log", plan.output_prefix)).exists());
}

#[test]
fn partition_then_ldscores_for_one_invocation() {
    let dir = tempdir().expect("tempdir");
    let u = universe();
    let bfile = write_plink(dir.path(), &u);
    let post: Vec<_> = u.iter().map(|v| posterior(v, v.bp as f64, 0.0)).collect();
    let posterior_path = dir.path().join("posterior.txt");
    write_posterior(&posterior_path, &post);

    let config = PolylocConfig {
        compute_ldscores: true,
        ld_wind_cm: Some(1.0),
        ..partition_config(dir.path(), posterior_path, bfile)
    };
    let plan = validate(&config).expect("plan");
    let output = run(&plan).expect("run");

    assert_eq!(output.annotation_files.len(), 44);
    let prefix = plan.output_prefix.as_str();
    let annot = read_gz(&annot_path(prefix, 9));
    assert_eq!(annot.lines().count(), 4);
    assert_eq!(read_text(&m_path(prefix, 9)), "1\t2\n");
}

#[test]
fn ldscores_alone_for_a_single_chromosome() {
    let dir = tempdir().expect("tempdir");
    let prefix = dir.path().join("run").display().to_string();
    let u = universe();
    let bfile = write_plink(dir.path(), &u);
    write_gz(
        &bins_path(&prefix, 2),
        "CHR\tSNP\tBP\tA1\tA2\tsnpvar_bin1\tsnpvar_bin2\n\
         2\trs2_0\t1000\tA\tG\t1\t0\n\
         2\trs2_1\t2000\tA\tG\t0\t1\n\
         2\trs2_2\t3000\tA\tG\t0\t1\n",
    );

    let config = PolylocConfig {
        compute_ldscores: true,
        chr: Some(2),
        bfile_chr: Some(bfile),
        output_prefix: prefix.clone(),
        ..Default::default()
    };
    let plan = validate(&config).expect("plan");
    let output = run(&plan).expect("run");
    assert_eq!(output.annotation_files.len(), 2);
    assert_eq!(read_text(&m_path(&prefix, 2)), "1\t2\n");
    assert!(!annot_path(&prefix, 1).exists());

    let log = read_text(Path::new(&format!("{prefix}.log")));
    assert!(log.contains("WARNING: no ld-wind argument specified"));
}

/// Writes noise-free regression inputs for two bins: chi^2 = 1 + N * (tau1 * l1 + tau2 * l2).
fn write_regression_inputs(dir: &Path, prefix: &str, taus: [f64; 2]) -> (PathBuf, String) {
    let w_prefix = dir.join("weights.").display().to_string();
    let mut sumstats = String::from("SNP\tA1\tA2\tZ\tN\n");
    for chr in 1..=22u8 {
        let mut ld = String::from("CHR\tSNP\tBP\tsnpvar_bin1L2\tsnpvar_bin2L2\n");
        let mut w = String::from("CHR\tSNP\tBP\tL2\n");
        for i in 0..SNPS_PER_CHR {
            let k = chr as usize * SNPS_PER_CHR + i;
            let l1 = 1.0 + (k % 7) as f64;
            let l2 = 1.0 + ((k * 3) % 11) as f64;
            let snp = format!("rs{chr}_{i}");
            let bp = 1000 * (i + 1);
            writeln!(ld, "{chr}\t{snp}\t{bp}\t{l1}\t{l2}").expect("fmt");
            writeln!(w, "{chr}\t{snp}\t{bp}\t{}", l1 + l2).expect("fmt");
            let chi = 1.0 + N * (taus[0] * l1 + taus[1] * l2);
            writeln!(sumstats, "{snp}\tA\tG\t{}\t{N}", chi.sqrt()).expect("fmt");
        }
        write_gz(&ldscore_path(prefix, chr), &ld);
        write_gz(&weights_path(&w_prefix, chr), &w);
        std::fs::write(m_path(prefix, chr), "100\t300\n").expect("write M");
    }
    let sumstats_path = dir.join("trait.sumstats");
    std::fs::write(&sumstats_path, sumstats).expect("write sumstats");
    std::fs::write(binsize_path(prefix), "BIN\tBIN_SIZE\n1\t100\n2\t300\n").expect("binsize");
    (sumstats_path, w_prefix)
}

fn localize_config(prefix: &str, sumstats: PathBuf, w_prefix: String) -> PolylocConfig {
    PolylocConfig {
        compute_polyloc: true,
        sumstats: Some(sumstats),
        w_ld_chr: Some(w_prefix),
        output_prefix: prefix.to_string(),
        n_blocks: 10,
        plot: true,
        ..Default::default()
    }
}

#[test]
fn localize_recovers_bin_coefficients() {
    let dir = tempdir().expect("tempdir");
    let prefix = dir.path().join("run").display().to_string();
    let (sumstats, w_prefix) = write_regression_inputs(dir.path(), &prefix, [2e-4, 5e-5]);

    let plan = validate(&localize_config(&prefix, sumstats, w_prefix)).expect("plan");
    let output = run(&plan).expect("run");
    let localized = output.localize.expect("localize output");

    let est = &localized.estimates;
    assert_eq!(est.n_snps, 22 * SNPS_PER_CHR);
    assert_relative_eq!(est.tau[0], 2e-4, max_relative = 1e-6);
    assert_relative_eq!(est.tau[1], 5e-5, max_relative = 1e-6);
    assert_relative_eq!(est.intercept, 1.0, max_relative = 1e-6);
    assert!(est.tau_se.iter().all(|se| se.is_finite() && *se < 1e-8));

    // contributions 0.02 and 0.015
    let rows = &localized.result.rows;
    assert_relative_eq!(rows[0].share, 0.02 / 0.035, max_relative = 1e-6);
    assert_relative_eq!(rows[1].cumulative, 1.0, max_relative = 1e-9);

    assert_eq!(
        read_text(&polyloc_path(&prefix)),
        "BIN\tBIN_SIZE\t%H2\tSUM_%H2\n1\t100\t0.57143\t0.57143\n2\t300\t0.42857\t1.00000\n"
    );
    assert!(plot_path(&prefix).exists());
}

#[test]
fn localize_with_no_signal_is_degenerate_and_writes_nothing() {
    let dir = tempdir().expect("tempdir");
    let prefix = dir.path().join("run").display().to_string();
    let (sumstats, w_prefix) = write_regression_inputs(dir.path(), &prefix, [0.0, 0.0]);

    let plan = validate(&localize_config(&prefix, sumstats, w_prefix)).expect("plan");
    let err = run(&plan).unwrap_err();
    assert!(matches!(polyloc_error(&err), PolylocError::DegenerateResult(_)));
    assert!(!polyloc_path(&prefix).exists());
    assert!(!plot_path(&prefix).exists());
}

#[test]
fn localize_rejects_bin_count_mismatch() {
    let dir = tempdir().expect("tempdir");
    let prefix = dir.path().join("run").display().to_string();
    let (sumstats, w_prefix) = write_regression_inputs(dir.path(), &prefix, [2e-4, 5e-5]);
    std::fs::write(binsize_path(&prefix), "BIN\tBIN_SIZE\n1\t100\n2\t200\n3\t100\n")
        .expect("binsize");

    let plan = validate(&localize_config(&prefix, sumstats, w_prefix)).expect("plan");
    let err = run(&plan).unwrap_err();
    assert!(matches!(polyloc_error(&err), PolylocError::ShapeMismatch(_)));
    assert!(!polyloc_path(&prefix).exists());
}

#[test]
fn localize_requires_ldscores_of_every_chromosome() {
    let dir = tempdir().expect("tempdir");
    let prefix = dir.path().join("run").display().to_string();
    let (sumstats, w_prefix) = write_regression_inputs(dir.path(), &prefix, [2e-4, 5e-5]);
    std::fs::remove_file(ldscore_path(&prefix, 13)).expect("remove");

    let plan = validate(&localize_config(&prefix, sumstats, w_prefix)).expect("plan");
    let err = run(&plan).unwrap_err();
    match polyloc_error(&err) {
        PolylocError::MissingFile(msg) => assert!(msg.contains(".13.l2.ldscore.gz"), "{msg}"),
        other => panic!("expected missing file error, got {other:?}"),
    }
}
