use std::io::BufRead;
use std::path::Path;

use anyhow::Context;

use crate::error::{PolylocError, Result};
use crate::io::{StagedFile, open_maybe_compressed, stage_text};
use crate::types::{BinAssignment, BinSize};

/// Counts the variants of every bin, bins `1..=n_bins` in ascending order.
pub fn aggregate(assignment: &BinAssignment) -> Result<Vec<BinSize>> {
    let mut counts = vec![0u64; assignment.n_bins];
    for (idx, row) in assignment.rows.iter().enumerate() {
        if row.bin == 0 || row.bin > assignment.n_bins {
            return Err(PolylocError::DataIntegrity(format!(
                "row {} has bin {} outside 1..={}",
                idx + 1,
                row.bin,
                assignment.n_bins
            )));
        }
        counts[row.bin - 1] += 1;
    }
    Ok(counts
        .into_iter()
        .enumerate()
        .map(|(i, size)| BinSize { bin: i + 1, size })
        .collect())
}

pub fn stage_bin_sizes(sizes: &[BinSize], path: &Path) -> anyhow::Result<StagedFile> {
    stage_text(path, false, |out| {
        writeln!(out, "BIN\tBIN_SIZE")?;
        for s in sizes {
            writeln!(out, "{}\t{}", s.bin, s.size)?;
        }
        Ok(())
    })
}

/// Reads a `.binsize` table; bin numbers must run consecutively from 1.
pub fn read_bin_sizes(path: &Path) -> anyhow::Result<Vec<BinSize>> {
    let reader = open_maybe_compressed(path)?;
    let source = path.display().to_string();
    let mut lines = reader.lines();
    let header = lines
        .next()
        .transpose()?
        .ok_or_else(|| PolylocError::DataIntegrity(format!("{source} is empty")))?;
    let columns: Vec<&str> = header.split_whitespace().collect();
    if columns != ["BIN", "BIN_SIZE"] {
        return Err(PolylocError::DataIntegrity(format!(
            "{source} must have header BIN BIN_SIZE, found {}",
            columns.join(" ")
        ))
        .into());
    }

    let mut sizes = Vec::new();
    for (idx, line) in lines.enumerate() {
        let line = line.with_context(|| format!("read {source}"))?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let parsed = match fields.as_slice() {
            [bin, size] => bin.parse::<usize>().ok().zip(size.parse::<u64>().ok()),
            _ => None,
        };
        let (bin, size) = parsed.ok_or_else(|| {
            PolylocError::DataIntegrity(format!("{source} data row {} is malformed", idx + 1))
        })?;
        if bin != sizes.len() + 1 {
            return Err(PolylocError::DataIntegrity(format!(
                "{source}: expected bin {} on data row {}, found {bin}",
                sizes.len() + 1,
                idx + 1
            ))
            .into());
        }
        sizes.push(BinSize { bin, size });
    }
    if sizes.is_empty() {
        return Err(PolylocError::DataIntegrity(format!("{source} lists no bins")).into());
    }
    Ok(sizes)
}
