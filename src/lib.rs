//! PolyLoc: polygenic localization of complex trait heritability.
//!
//! Variants are partitioned into bins by their posterior effect variance, the
//! bins are exported as LD-score annotations, and a stratified LD-score
//! regression over the bins yields the share of heritability each bin carries.

pub mod error;
pub mod logging;
pub mod types;

pub mod df_utils;
pub mod io;
pub mod matrix;
pub mod paths;
pub mod plot_utils;
pub mod qc;
pub mod schema;
mod stats;

pub mod annotate;
pub mod binsize;
pub mod cluster;
pub mod localize;
pub mod mode;
pub mod partition;
pub mod pipeline;
pub mod regression;
