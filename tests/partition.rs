mod common;

use std::collections::HashSet;

use tempfile::tempdir;

use common::{polyloc_error, posterior, read_gz, variant, write_posterior};
use polyloc::binsize::aggregate;
use polyloc::cluster::{BinLabels, KMeans1d};
use polyloc::error::PolylocError;
use polyloc::io::{publish_all, read_bin_file};
use polyloc::partition::{assign_bins, load_posterior, partition, stage_bin_files};
use polyloc::paths::bins_path;
use polyloc::types::{BinSize, Variant, VariantKey};

fn universe() -> Vec<Variant> {
    vec![
        variant(1, "v1", 100),
        variant(1, "v2", 200),
        variant(1, "v3", 300),
        variant(2, "v4", 150),
        variant(2, "v5", 50),
    ]
}

#[test]
fn residual_bin_collects_variants_without_posterior() {
    let u = universe();
    let post: Vec<_> = u[..3].iter().map(|v| posterior(v, 0.1, 0.1)).collect();
    let labels = BinLabels {
        labels: vec![1, 1, 2],
        n_bins: 2,
    };
    let assignment = assign_bins(&post, &labels, &u).expect("assign");

    assert_eq!(assignment.n_bins, 3);
    assert_eq!(assignment.residual_bin, Some(3));
    let bins: Vec<(String, usize)> = assignment
        .rows
        .iter()
        .map(|r| (r.variant.snp.clone(), r.bin))
        .collect();
    assert_eq!(
        bins,
        vec![
            ("v1".to_string(), 1),
            ("v2".to_string(), 1),
            ("v3".to_string(), 2),
            ("v4".to_string(), 3),
            ("v5".to_string(), 3),
        ]
    );
    assert_eq!(
        aggregate(&assignment).expect("aggregate"),
        vec![
            BinSize { bin: 1, size: 2 },
            BinSize { bin: 2, size: 1 },
            BinSize { bin: 3, size: 2 },
        ]
    );
}

#[test]
fn every_universe_variant_is_assigned_exactly_once() {
    let u = universe();
    let post: Vec<_> = [0, 2, 4].iter().map(|&i| posterior(&u[i], 0.2, 0.05)).collect();
    let assignment = partition(&post, &u, &KMeans1d::new(2)).expect("partition");

    assert_eq!(assignment.len(), u.len());
    let keys: HashSet<VariantKey> = assignment.rows.iter().map(|r| r.variant.key()).collect();
    let expected: HashSet<VariantKey> = u.iter().map(Variant::key).collect();
    assert_eq!(keys, expected);
    for row in 0..assignment.len() {
        let flags = assignment.flags(row);
        assert_eq!(flags.len(), assignment.n_bins);
        assert_eq!(flags.iter().filter(|f| **f).count(), 1);
    }
}

#[test]
fn full_posterior_coverage_adds_no_residual_bin() {
    let u = universe();
    let post: Vec<_> = u
        .iter()
        .enumerate()
        .map(|(i, v)| posterior(v, i as f64, 0.0))
        .collect();
    let labels = BinLabels {
        labels: vec![2, 2, 2, 1, 1],
        n_bins: 2,
    };
    let assignment = assign_bins(&post, &labels, &u).expect("assign");
    assert_eq!(assignment.n_bins, 2);
    assert_eq!(assignment.residual_bin, None);
}

#[test]
fn posterior_variant_missing_from_genotypes_is_rejected() {
    let u = universe();
    let mut post: Vec<_> = u[..2].iter().map(|v| posterior(v, 0.1, 0.1)).collect();
    post.push(posterior(&variant(1, "ghost", 400), 0.3, 0.1));
    let labels = BinLabels {
        labels: vec![1, 1, 1],
        n_bins: 1,
    };
    match assign_bins(&post, &labels, &u) {
        Err(PolylocError::DataIntegrity(msg)) => {
            assert!(msg.contains("found 1 variants"), "{msg}");
            assert!(msg.contains("ghost:A:G"), "{msg}");
        }
        other => panic!("expected data integrity error, got {other:?}"),
    }
}

#[test]
fn allele_mismatch_counts_as_a_different_variant() {
    let u = universe();
    let mut record = posterior(&u[0], 0.1, 0.1);
    record.a1 = "G".to_string();
    record.a2 = "A".to_string();
    let labels = BinLabels {
        labels: vec![1],
        n_bins: 1,
    };
    let err = assign_bins(&[record], &labels, &u).unwrap_err();
    assert!(matches!(err, PolylocError::DataIntegrity(_)));
}

#[test]
fn duplicated_posterior_variant_is_rejected() {
    let u = universe();
    let post = vec![posterior(&u[0], 0.1, 0.1), posterior(&u[0], 0.2, 0.1)];
    let labels = BinLabels {
        labels: vec![1, 1],
        n_bins: 1,
    };
    let err = assign_bins(&post, &labels, &u).unwrap_err();
    assert!(matches!(err, PolylocError::DataIntegrity(_)));
}

#[test]
fn label_count_must_match_posterior() {
    let u = universe();
    let post = vec![posterior(&u[0], 0.1, 0.1), posterior(&u[1], 0.2, 0.1)];
    let labels = BinLabels {
        labels: vec![1],
        n_bins: 1,
    };
    let err = assign_bins(&post, &labels, &u).unwrap_err();
    assert!(matches!(err, PolylocError::ShapeMismatch(_)));
}

#[test]
fn empty_posterior_puts_whole_universe_in_residual_bin() {
    let u = universe();
    let assignment = partition(&[], &u, &KMeans1d::new(3)).expect("partition");

    assert_eq!(assignment.n_bins, 1);
    assert_eq!(assignment.residual_bin, Some(1));
    assert!(assignment.rows.iter().all(|r| r.bin == 1));
    assert_eq!(
        aggregate(&assignment).expect("aggregate"),
        vec![BinSize {
            bin: 1,
            size: u.len() as u64
        }]
    );
}

#[test]
fn duplicated_genotype_variant_is_rejected() {
    let mut u = universe();
    u.push(variant(7, "v2", 900));
    let post = vec![posterior(&u[0], 0.1, 0.1)];
    let labels = BinLabels {
        labels: vec![1],
        n_bins: 1,
    };
    match assign_bins(&post, &labels, &u) {
        Err(PolylocError::DataIntegrity(msg)) => {
            assert!(msg.contains("v2:A:G"), "{msg}");
            assert!(msg.contains("chr 1") && msg.contains("chr 7"), "{msg}");
        }
        other => panic!("expected data integrity error, got {other:?}"),
    }
}

#[test]
fn header_only_posterior_has_no_records() {
    let dir = tempdir().expect("tempdir");
    let tab = dir.path().join("tab.txt");
    std::fs::write(&tab, "SNP\tCHR\tBP\tA1\tA2\tBETA_MEAN\tBETA_SD\n").expect("write");
    let spaced = dir.path().join("spaced.txt");
    std::fs::write(&spaced, "SNP CHR BP A1 A2 BETA_MEAN BETA_SD\n").expect("write");

    assert!(load_posterior(&tab).expect("load tab").is_empty());
    assert!(load_posterior(&spaced).expect("load spaced").is_empty());
}

#[test]
fn posterior_headers_are_case_insensitive() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("posterior.txt");
    let u = universe();
    let rows: Vec<_> = u.iter().map(|v| posterior(v, 0.5, 0.25)).collect();
    write_posterior(&path, &rows);

    let loaded = load_posterior(&path).expect("load");
    assert_eq!(loaded.len(), 5);
    assert_eq!(loaded[3].snp, "v4");
    assert!((loaded[3].variance() - 0.3125).abs() < 1e-12);
}

#[test]
fn posterior_missing_columns_are_all_reported() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("posterior.txt");
    std::fs::write(&path, "SNP\tCHR\tBP\tA1\tA2\nv1\t1\t100\tA\tG\n").expect("write");

    let err = load_posterior(&path).unwrap_err();
    match polyloc_error(&err) {
        PolylocError::DataIntegrity(msg) => {
            assert!(msg.contains("BETA_MEAN"), "{msg}");
            assert!(msg.contains("BETA_SD"), "{msg}");
        }
        other => panic!("expected data integrity error, got {other:?}"),
    }
}

#[test]
fn bin_files_are_one_hot_and_sorted_by_position() {
    let dir = tempdir().expect("tempdir");
    let prefix = dir.path().join("run").display().to_string();
    let u = universe();
    let post: Vec<_> = u[..3].iter().map(|v| posterior(v, 0.1, 0.1)).collect();
    let labels = BinLabels {
        labels: vec![2, 1, 2],
        n_bins: 2,
    };
    let assignment = assign_bins(&post, &labels, &u).expect("assign");

    let staged = stage_bin_files(&assignment, &prefix).expect("stage");
    assert_eq!(staged.len(), 22);
    assert!(!bins_path(&prefix, 1).exists());
    publish_all(staged).expect("publish");

    let chr2 = read_gz(&bins_path(&prefix, 2));
    let lines: Vec<&str> = chr2.lines().collect();
    assert_eq!(
        lines,
        vec![
            "CHR\tSNP\tBP\tA1\tA2\tsnpvar_bin1\tsnpvar_bin2\tsnpvar_bin3",
            "2\tv5\t50\tA\tG\t0\t0\t1",
            "2\tv4\t150\tA\tG\t0\t0\t1",
        ]
    );

    let chr1 = read_bin_file(&bins_path(&prefix, 1)).expect("read bins");
    assert_eq!(chr1.n_bins, 3);
    let bins: Vec<usize> = chr1.rows.iter().map(|(_, b)| *b).collect();
    assert_eq!(bins, vec![2, 1, 2]);

    let empty = read_bin_file(&bins_path(&prefix, 22)).expect("read bins");
    assert_eq!(empty.n_bins, 3);
    assert!(empty.rows.is_empty());
}
