/// Identity of a variant across sources: rs-id plus both alleles.
///
/// Chromosome and position are deliberately not part of the key; the
/// posterior file and the genotype metadata may disagree on coordinates
/// (e.g. different builds) while still describing the same variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantKey {
    pub snp: String,
    pub a1: String,
    pub a2: String,
}

impl VariantKey {
    pub fn new(snp: impl Into<String>, a1: impl Into<String>, a2: impl Into<String>) -> Self {
        Self {
            snp: snp.into(),
            a1: a1.into(),
            a2: a2.into(),
        }
    }
}

impl std::fmt::Display for VariantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.snp, self.a1, self.a2)
    }
}

/// One line of a `.bim` file.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub chr: u8,
    pub snp: String,
    pub cm: f64,
    pub bp: i64,
    pub a1: String,
    pub a2: String,
}

impl Variant {
    pub fn key(&self) -> VariantKey {
        VariantKey::new(self.snp.clone(), self.a1.clone(), self.a2.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PosteriorRecord {
    pub snp: String,
    pub chr: String,
    pub bp: i64,
    pub a1: String,
    pub a2: String,
    pub beta_mean: f64,
    pub beta_sd: f64,
}

impl PosteriorRecord {
    pub fn key(&self) -> VariantKey {
        VariantKey::new(self.snp.clone(), self.a1.clone(), self.a2.clone())
    }

    /// Second moment of the posterior effect size; the ranking statistic for binning.
    pub fn variance(&self) -> f64 {
        self.beta_mean * self.beta_mean + self.beta_sd * self.beta_sd
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinnedVariant {
    pub variant: Variant,
    /// 1-based bin number.
    pub bin: usize,
}

/// Complete, mutually exclusive assignment of the variant universe to bins.
///
/// Stored as one bin number per row; the one-hot matrix is a view over it, so
/// each row has exactly one `true` column.
#[derive(Debug, Clone)]
pub struct BinAssignment {
    pub rows: Vec<BinnedVariant>,
    pub n_bins: usize,
    /// Bin number of the residual bin, when one had to be added.
    pub residual_bin: Option<usize>,
}

impl BinAssignment {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// One-hot flags of a row, column `j` standing for bin `j + 1`.
    pub fn flags(&self, row: usize) -> Vec<bool> {
        let bin = self.rows[row].bin;
        (1..=self.n_bins).map(|b| b == bin).collect()
    }

    pub fn column_names(&self) -> Vec<String> {
        bin_column_names(self.n_bins)
    }
}

pub fn bin_column_names(n_bins: usize) -> Vec<String> {
    (1..=n_bins).map(|b| format!("snpvar_bin{b}")).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinSize {
    pub bin: usize,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalizationRow {
    pub bin: usize,
    pub size: u64,
    pub contribution: f64,
    pub share: f64,
    pub cumulative: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalizationResult {
    pub rows: Vec<LocalizationRow>,
    pub total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LdWindow {
    Centimorgans(f64),
    Kilobases(u64),
    Snps(u64),
}

impl std::fmt::Display for LdWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LdWindow::Centimorgans(v) => write!(f, "{v} cM"),
            LdWindow::Kilobases(v) => write!(f, "{v} kb"),
            LdWindow::Snps(v) => write!(f, "{v} SNPs"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TauEstimates {
    pub tau: Vec<f64>,
    pub tau_se: Vec<f64>,
    pub intercept: f64,
    pub intercept_se: f64,
    pub n_bar: f64,
    pub h2: f64,
    pub h2_se: f64,
    pub n_snps: usize,
}
