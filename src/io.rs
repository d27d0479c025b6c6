use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bzip2::read::BzDecoder;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use polars::prelude::*;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::PolylocError;
use crate::paths::bim_path;
use crate::schema::SNP_COLUMNS;
use crate::types::{Variant, VariantKey};

/// Reads a delimited table, `.parquet`, or a `.gz`/`.bz2` compressed text table.
pub fn read_table(path: &Path) -> Result<DataFrame> {
    let ext = extension(path);
    if ext == "parquet" {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        return ParquetReader::new(file)
            .finish()
            .with_context(|| format!("read parquet {}", path.display()));
    }
    if ext == "gz" || ext == "bz2" {
        let tmp = decompress_to_temp(path, &ext)?;
        return read_table_plain(tmp.path())
            .with_context(|| format!("read {}", path.display()));
    }
    read_table_plain(path)
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn read_table_plain(path: &Path) -> Result<DataFrame> {
    let delimiter = detect_delimiter(path)?;
    if delimiter == b' ' {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        return read_table_whitespace(BufReader::new(file));
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_parse_options(
            CsvParseOptions::default()
                .with_separator(delimiter)
                .with_null_values(Some(NullValues::AllColumns(vec![
                    "".into(),
                    "NA".into(),
                    "NaN".into(),
                    ".".into(),
                ])))
                .with_missing_is_null(true),
        )
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
        .with_context(|| format!("read {}", path.display()))?;
    Ok(df)
}

/// Whitespace-delimited text; every column is loaded as a string and cast later.
fn read_table_whitespace<R: Read>(reader: R) -> Result<DataFrame> {
    let mut reader = BufReader::new(reader);
    let mut header_line = String::new();
    reader.read_line(&mut header_line)?;
    if header_line.trim().is_empty() {
        return Err(anyhow::anyhow!("empty file"));
    }
    let headers: Vec<&str> = header_line.split_whitespace().collect();
    let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        for col in columns.iter_mut() {
            col.push(parts.next().and_then(missing_token_to_none));
        }
    }

    let cols: Vec<Column> = headers
        .iter()
        .zip(columns)
        .map(|(name, values)| Series::new((*name).into(), values).into_column())
        .collect();
    Ok(DataFrame::new(cols)?)
}

fn missing_token_to_none(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed.eq_ignore_ascii_case("NA")
        || trimmed.eq_ignore_ascii_case("NAN")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn detect_delimiter(path: &Path) -> Result<u8> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut first = String::new();
    reader.read_line(&mut first)?;
    if first.contains('\t') {
        return Ok(b'\t');
    }
    if first.contains(',') {
        return Ok(b',');
    }
    Ok(b' ')
}

fn decompress_to_temp(path: &Path, ext: &str) -> Result<NamedTempFile> {
    let mut decoder = open_decoder(path, ext)?;
    let mut tmp = NamedTempFile::new()?;
    std::io::copy(&mut decoder, &mut tmp)
        .with_context(|| format!("decompress {}", path.display()))?;
    Ok(tmp)
}

fn open_decoder(path: &Path, ext: &str) -> Result<Box<dyn Read>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    Ok(match ext {
        "gz" => Box::new(GzDecoder::new(file)),
        "bz2" => Box::new(BzDecoder::new(file)),
        _ => Box::new(file),
    })
}

pub fn open_maybe_compressed(path: &Path) -> Result<Box<dyn BufRead>> {
    let decoder = open_decoder(path, &extension(path))?;
    Ok(Box::new(BufReader::new(decoder)))
}

/// Parses a PLINK chromosome code, accepting an optional `chr` prefix.
pub fn parse_chromosome(token: &str) -> Option<u8> {
    let trimmed = token.trim();
    let digits = if trimmed.len() > 3 && trimmed[..3].eq_ignore_ascii_case("chr") {
        &trimmed[3..]
    } else {
        trimmed
    };
    digits.parse::<u8>().ok().filter(|c| (1..=22).contains(c))
}

/// Reads a headerless PLINK `.bim` file (`CHR SNP CM BP A1 A2`).
pub fn read_bim(path: &Path) -> Result<Vec<Variant>> {
    let reader = open_maybe_compressed(path)?;
    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let bad_line = |what: &str| {
            PolylocError::DataIntegrity(format!(
                "{} line {}: {what}",
                path.display(),
                idx + 1
            ))
        };
        if fields.len() < 6 {
            return Err(bad_line(&format!("expected 6 fields, found {}", fields.len())).into());
        }
        let chr = parse_chromosome(fields[0])
            .ok_or_else(|| bad_line(&format!("invalid autosome code {}", fields[0])))?;
        let cm = fields[2]
            .parse::<f64>()
            .map_err(|_| bad_line(&format!("invalid genetic position {}", fields[2])))?;
        let bp = fields[3]
            .parse::<i64>()
            .map_err(|_| bad_line(&format!("invalid base-pair position {}", fields[3])))?;
        out.push(Variant {
            chr,
            snp: fields[1].to_string(),
            cm,
            bp,
            a1: fields[4].to_string(),
            a2: fields[5].to_string(),
        });
    }
    Ok(out)
}

/// Concatenates the `.bim` files of the given chromosomes, in chromosome order.
pub fn read_universe(bfile_chr: &str, chromosomes: &[u8]) -> Result<Vec<Variant>> {
    let mut universe = Vec::new();
    for &chr in chromosomes {
        let path = bim_path(bfile_chr, chr);
        let mut variants =
            read_bim(&path).with_context(|| format!("read genotype metadata for chr {chr}"))?;
        universe.append(&mut variants);
    }
    Ok(universe)
}

/// A file written under a temporary name next to its destination and renamed
/// into place by [`StagedFile::publish`].
#[derive(Debug)]
pub struct StagedFile {
    tmp: NamedTempFile,
    target: PathBuf,
}

impl StagedFile {
    pub fn create(target: &Path) -> Result<Self> {
        let dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let tmp = tempfile::Builder::new()
            .prefix(".polyloc-")
            .tempfile_in(&dir)
            .with_context(|| format!("create temporary file in {}", dir.display()))?;
        Ok(Self {
            tmp,
            target: target.to_path_buf(),
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn publish(self) -> Result<PathBuf> {
        let target = self.target;
        self.tmp
            .persist(&target)
            .map_err(|e| e.error)
            .with_context(|| format!("publish {}", target.display()))?;
        Ok(target)
    }
}

/// Writes a text file through `body` into a staged temporary file, gzip
/// compressing it when requested. Nothing is visible at the target path until
/// the returned file is published.
pub fn stage_text<F>(target: &Path, gzip: bool, body: F) -> Result<StagedFile>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let mut staged = StagedFile::create(target)?;
    if gzip {
        let mut encoder = GzEncoder::new(
            BufWriter::new(staged.tmp.as_file_mut()),
            Compression::default(),
        );
        body(&mut encoder)?;
        let mut inner = encoder.finish()?;
        inner.flush()?;
    } else {
        let mut writer = BufWriter::new(staged.tmp.as_file_mut());
        body(&mut writer)?;
        writer.flush()?;
    }
    Ok(staged)
}

/// Publishes staged files in order. Call only once every file of a stage has
/// been staged successfully.
///
/// Each file is renamed into place atomically. If a rename fails, the files
/// already published by this call are removed again, so a stage never leaves
/// part of its new output behind. Files they replaced are not restored.
pub fn publish_all(staged: Vec<StagedFile>) -> Result<Vec<PathBuf>> {
    let mut published = Vec::with_capacity(staged.len());
    for file in staged {
        match file.publish() {
            Ok(path) => published.push(path),
            Err(err) => {
                for path in &published {
                    if let Err(rm) = std::fs::remove_file(path) {
                        warn!("could not remove {}: {rm}", path.display());
                    }
                }
                return Err(err);
            }
        }
    }
    Ok(published)
}

/// Rows of one persisted per-chromosome bin file.
#[derive(Debug, Clone)]
pub struct BinFile {
    pub n_bins: usize,
    pub rows: Vec<(VariantKey, usize)>,
}

pub fn read_bin_file(path: &Path) -> Result<BinFile> {
    let mut reader = open_maybe_compressed(path)?;
    let mut header = String::new();
    reader.read_line(&mut header)?;
    let columns: Vec<&str> = header.trim_end().split('\t').collect();
    let integrity = |msg: String| PolylocError::DataIntegrity(format!("{}: {msg}", path.display()));
    if columns.len() <= SNP_COLUMNS.len() || columns[..SNP_COLUMNS.len()] != SNP_COLUMNS {
        return Err(integrity(format!(
            "expected header {} followed by bin columns",
            SNP_COLUMNS.join(" ")
        ))
        .into());
    }
    let n_bins = columns.len() - SNP_COLUMNS.len();

    let mut rows = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != columns.len() {
            return Err(integrity(format!(
                "data row {} has {} fields, expected {}",
                idx + 1,
                fields.len(),
                columns.len()
            ))
            .into());
        }
        let mut bin = None;
        for (j, flag) in fields[SNP_COLUMNS.len()..].iter().enumerate() {
            if parse_flag(flag).ok_or_else(|| {
                integrity(format!("data row {} has non-boolean value {flag}", idx + 1))
            })? {
                if bin.is_some() {
                    return Err(
                        integrity(format!("data row {} belongs to several bins", idx + 1)).into(),
                    );
                }
                bin = Some(j + 1);
            }
        }
        let bin = bin.ok_or_else(|| integrity(format!("data row {} belongs to no bin", idx + 1)))?;
        rows.push((VariantKey::new(fields[1], fields[3], fields[4]), bin));
    }
    Ok(BinFile { n_bins, rows })
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "True" | "true" | "TRUE" => Some(true),
        "0" | "False" | "false" | "FALSE" => Some(false),
        _ => None,
    }
}

/// Sums whitespace-separated per-annotation counts over every line of an `M` file.
pub fn read_m_values(path: &Path) -> Result<Vec<f64>> {
    let reader = open_maybe_compressed(path)?;
    let mut sums: Vec<f64> = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let vals = line
            .split_whitespace()
            .map(|v| {
                v.parse::<f64>()
                    .with_context(|| format!("non-numeric value {v} in {}", path.display()))
            })
            .collect::<Result<Vec<f64>>>()?;
        if sums.is_empty() {
            sums = vec![0.0; vals.len()];
        }
        if vals.len() != sums.len() {
            return Err(anyhow::anyhow!(
                "Inconsistent column count in {}",
                path.display()
            ));
        }
        for (s, v) in sums.iter_mut().zip(&vals) {
            *s += v;
        }
    }
    Ok(sums)
}
