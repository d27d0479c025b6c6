use crate::error::{PolylocError, Result};

/// Bin labels for a sequence of variances, aligned by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinLabels {
    /// 1-based labels, each in `1..=n_bins`.
    pub labels: Vec<usize>,
    pub n_bins: usize,
}

/// Groups per-variant effect variances into ordered bins.
pub trait VarianceClusterer {
    fn cluster(&self, variances: &[f64]) -> Result<BinLabels>;
}

/// Lloyd's k-means on a single dimension.
///
/// Bins are numbered by decreasing centre, so bin 1 holds the variants with
/// the largest estimated effect variance. Clusters that end up empty are
/// dropped, which can leave fewer than `n_bins` bins.
#[derive(Debug, Clone)]
pub struct KMeans1d {
    pub n_bins: usize,
    pub max_iter: usize,
}

impl KMeans1d {
    pub fn new(n_bins: usize) -> Self {
        Self {
            n_bins,
            max_iter: 300,
        }
    }
}

impl VarianceClusterer for KMeans1d {
    fn cluster(&self, variances: &[f64]) -> Result<BinLabels> {
        if self.n_bins == 0 {
            return Err(PolylocError::Configuration(
                "number of bins must be at least 1".to_string(),
            ));
        }
        if let Some(pos) = variances.iter().position(|v| !v.is_finite()) {
            return Err(PolylocError::DataIntegrity(format!(
                "non-finite effect variance at posterior row {}",
                pos + 1
            )));
        }
        let n = variances.len();
        if n == 0 {
            return Ok(BinLabels {
                labels: Vec::new(),
                n_bins: 0,
            });
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| variances[a].total_cmp(&variances[b]));
        let sorted: Vec<f64> = order.iter().map(|&i| variances[i]).collect();
        let mut prefix = vec![0.0; n + 1];
        for (i, v) in sorted.iter().enumerate() {
            prefix[i + 1] = prefix[i] + v;
        }

        let mut centres = initial_centres(&sorted, self.n_bins);
        let mut bounds = segment_bounds(&sorted, &centres);
        for _ in 0..self.max_iter {
            let updated: Vec<f64> = bounds
                .windows(2)
                .filter(|w| w[1] > w[0])
                .map(|w| (prefix[w[1]] - prefix[w[0]]) / (w[1] - w[0]) as f64)
                .collect();
            if updated == centres {
                break;
            }
            centres = updated;
            bounds = segment_bounds(&sorted, &centres);
        }

        let segments: Vec<(usize, usize)> = bounds
            .windows(2)
            .filter(|w| w[1] > w[0])
            .map(|w| (w[0], w[1]))
            .collect();
        let n_bins = segments.len();
        let mut labels = vec![0usize; n];
        for (s, &(start, end)) in segments.iter().enumerate() {
            let label = n_bins - s;
            for &row in &order[start..end] {
                labels[row] = label;
            }
        }
        Ok(BinLabels { labels, n_bins })
    }
}

/// Distinct quantile centres of sorted data, ascending.
fn initial_centres(sorted: &[f64], k: usize) -> Vec<f64> {
    let n = sorted.len();
    let k = k.min(n);
    let mut centres: Vec<f64> = (0..k)
        .map(|i| {
            let pos = ((i as f64 + 0.5) / k as f64 * n as f64) as usize;
            sorted[pos.min(n - 1)]
        })
        .collect();
    centres.dedup();
    centres
}

/// Segment boundaries of sorted data under nearest-centre assignment.
///
/// Returns `centres.len() + 1` offsets starting at 0 and ending at
/// `sorted.len()`; values on a midpoint go to the lower centre.
fn segment_bounds(sorted: &[f64], centres: &[f64]) -> Vec<usize> {
    let mut bounds = Vec::with_capacity(centres.len() + 1);
    bounds.push(0);
    for pair in centres.windows(2) {
        let mid = pair[0] + (pair[1] - pair[0]) / 2.0;
        bounds.push(sorted.partition_point(|v| *v <= mid));
    }
    bounds.push(sorted.len());
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separated_groups_are_labelled_by_decreasing_variance() {
        let values = vec![0.01, 5.0, 0.02, 5.1, 1.0, 0.015, 1.1];
        let out = KMeans1d::new(3).cluster(&values).expect("cluster");
        assert_eq!(out.n_bins, 3);
        assert_eq!(out.labels, vec![3, 1, 3, 1, 2, 3, 2]);
    }

    #[test]
    fn more_bins_than_distinct_values_collapses() {
        let values = vec![2.0, 2.0, 2.0, 7.0];
        let out = KMeans1d::new(5).cluster(&values).expect("cluster");
        assert_eq!(out.n_bins, 2);
        assert_eq!(out.labels, vec![2, 2, 2, 1]);
    }

    #[test]
    fn huge_bin_request_is_clamped_to_data() {
        let values = vec![0.1, 0.2, 3.0];
        let out = KMeans1d::new(usize::MAX / 2).cluster(&values).expect("cluster");
        assert_eq!(out.n_bins, 3);
        assert_eq!(out.labels, vec![3, 2, 1]);
    }

    #[test]
    fn empty_input_has_no_bins() {
        let out = KMeans1d::new(4).cluster(&[]).expect("cluster");
        assert_eq!(out.n_bins, 0);
        assert!(out.labels.is_empty());
    }

    #[test]
    fn non_finite_variance_is_rejected() {
        let err = KMeans1d::new(2).cluster(&[1.0, f64::NAN]).unwrap_err();
        assert!(matches!(err, PolylocError::DataIntegrity(_)));
    }

    #[test]
    fn segment_bounds_cover_all_rows() {
        let sorted = vec![0.0, 1.0, 2.0, 3.0, 10.0];
        let bounds = segment_bounds(&sorted, &[0.5, 9.0]);
        assert_eq!(bounds, vec![0, 4, 5]);
    }
}
