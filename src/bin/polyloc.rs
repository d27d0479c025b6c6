use std::path::PathBuf;

use clap::Parser;

use polyloc::logging::init_tracing;
use polyloc::mode::{DEFAULT_N_BLOCKS, PolylocConfig, validate};
use polyloc::pipeline::run;

#[derive(Parser)]
#[command(name = "polyloc")]
#[command(about = "Polygenic localization of complex trait heritability", long_about = None)]
struct Cli {
    /// Partition variants into bins by posterior effect variance
    #[arg(long)]
    compute_partitions: bool,
    /// Export the bins as LD-score annotations
    #[arg(long)]
    compute_ldscores: bool,
    /// Estimate per-bin heritability and the localization curve
    #[arg(long)]
    compute_polyloc: bool,
    #[arg(long)]
    num_bins: Option<usize>,
    /// Restrict --compute-ldscores to one chromosome
    #[arg(long)]
    chr: Option<u8>,
    #[arg(long)]
    ld_wind_cm: Option<f64>,
    #[arg(long)]
    ld_wind_kb: Option<u64>,
    #[arg(long)]
    ld_wind_snps: Option<u64>,
    /// File with individuals to keep for LD-score estimation
    #[arg(long)]
    keep: Option<PathBuf>,
    /// Summary statistics with SNP, Z and N columns
    #[arg(long)]
    sumstats: Option<PathBuf>,
    /// Posterior effect sizes with SNP CHR BP A1 A2 BETA_MEAN BETA_SD columns
    #[arg(long)]
    posterior: Option<PathBuf>,
    /// Prefix of the per-chromosome regression weight LD-scores
    #[arg(long)]
    w_ld_chr: Option<String>,
    /// Prefix of the per-chromosome plink files
    #[arg(long)]
    bfile_chr: Option<String>,
    #[arg(long, default_value_t = DEFAULT_N_BLOCKS)]
    n_blocks: usize,
    /// Also write an html plot of the localization curve
    #[arg(long)]
    plot: bool,
    #[arg(long, required = true)]
    output_prefix: String,
}

impl From<Cli> for PolylocConfig {
    fn from(cli: Cli) -> Self {
        Self {
            compute_partitions: cli.compute_partitions,
            compute_ldscores: cli.compute_ldscores,
            compute_polyloc: cli.compute_polyloc,
            num_bins: cli.num_bins,
            chr: cli.chr,
            ld_wind_cm: cli.ld_wind_cm,
            ld_wind_kb: cli.ld_wind_kb,
            ld_wind_snps: cli.ld_wind_snps,
            keep: cli.keep,
            sumstats: cli.sumstats,
            posterior: cli.posterior,
            w_ld_chr: cli.w_ld_chr,
            bfile_chr: cli.bfile_chr,
            output_prefix: cli.output_prefix,
            n_blocks: cli.n_blocks,
            plot: cli.plot,
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = PolylocConfig::from(Cli::parse());
    let plan = validate(&config)?;
    run(&plan)?;
    Ok(())
}
