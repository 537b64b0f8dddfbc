use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use memmap2::Mmap;
use tracing::{debug, info, warn};

use crate::error::{ReconError, Result};

pub(crate) const BINCODE_CONFIG: bincode::config::Configuration = bincode::config::standard()
    .with_little_endian()
    .with_variable_int_encoding();

/// Side file holding the decoded values of `path`: same stem, `.bin`
/// extension.
pub fn cache_path(path: &Path) -> PathBuf {
    path.with_extension("bin")
}

/// Loads a flat vector of doubles from a CSV file.
///
/// If the `.bin` side file exists it is used instead of the CSV. Otherwise
/// the CSV is parsed (`,`, `;` and whitespace all separate values; tokens
/// that are not numbers are skipped) and the side file is written for the
/// next load. A failed cache write is logged and otherwise ignored.
///
/// # Errors
///
/// - `Io` if neither the cache nor the CSV can be read
/// - `EmptyInput` if no values were found
/// - `CacheDecode` if the side file is corrupt and no CSV is available, or
///   `EmptyInput` if it is empty
pub fn load_vector(path: &Path) -> Result<Vec<f64>> {
    let cache = cache_path(path);

    if cache.exists() {
        match read_cache(&cache) {
            Ok(values) => {
                debug!(path = %cache.display(), len = values.len(), "binary cache hit");
                return non_empty(values, path);
            }
            Err(e) if cache != path && path.exists() => {
                warn!(path = %cache.display(), error = %e, "ignoring unreadable cache");
            }
            Err(e) => return Err(e),
        }
    }

    info!(path = %path.display(), "parsing CSV");
    let values = non_empty(parse_csv(path)?, path)?;

    if cache != path {
        if let Err(e) = write_cache(&cache, &values) {
            warn!(path = %cache.display(), error = %e, "could not write binary cache");
        }
    }
    Ok(values)
}

fn non_empty(values: Vec<f64>, path: &Path) -> Result<Vec<f64>> {
    if values.is_empty() {
        return Err(ReconError::EmptyInput {
            path: path.to_path_buf(),
        });
    }
    Ok(values)
}

fn map_file(path: &Path) -> Result<Option<Mmap>> {
    let file = File::open(path).map_err(|e| ReconError::io(path, e))?;
    let len = file.metadata().map_err(|e| ReconError::io(path, e))?.len();
    if len == 0 {
        return Ok(None);
    }
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| ReconError::io(path, e))?;
    Ok(Some(mmap))
}

fn parse_csv(path: &Path) -> Result<Vec<f64>> {
    Ok(match map_file(path)? {
        Some(mmap) => parse_values(&mmap),
        None => Vec::new(),
    })
}

/// Parses every numeric token in `bytes`, in order.
pub fn parse_values(bytes: &[u8]) -> Vec<f64> {
    bytes
        .split(|&b| b == b',' || b == b';' || b.is_ascii_whitespace())
        .filter(|token| !token.is_empty())
        .filter_map(|token| std::str::from_utf8(token).ok()?.parse::<f64>().ok())
        .collect()
}

fn read_cache(path: &Path) -> Result<Vec<f64>> {
    match map_file(path)? {
        Some(mmap) => {
            let (values, _): (Vec<f64>, _) =
                bincode::serde::decode_from_slice(&mmap, BINCODE_CONFIG)?;
            Ok(values)
        }
        None => Err(ReconError::EmptyInput {
            path: path.to_path_buf(),
        }),
    }
}

// Written to a unique temporary file and renamed, so concurrent loaders of
// the same CSV never observe a partial cache.
fn write_cache(path: &Path, values: &[f64]) -> Result<()> {
    static NEXT_TMP: AtomicU64 = AtomicU64::new(0);

    let bytes = bincode::serde::encode_to_vec(values, BINCODE_CONFIG)?;
    let tmp = path.with_extension(format!(
        "bin.{}.{}.tmp",
        std::process::id(),
        NEXT_TMP.fetch_add(1, Ordering::Relaxed)
    ));
    fs::write(&tmp, bytes).map_err(|e| ReconError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        ReconError::io(path, e)
    })
}

/// Writes `values` as CSV with `row_len` comma-separated values per line.
pub fn write_csv(path: &Path, values: &[f64], row_len: usize) -> Result<()> {
    let file = File::create(path).map_err(|e| ReconError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    for row in values.chunks(row_len.max(1)) {
        let line = row
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        writeln!(writer, "{line}").map_err(|e| ReconError::io(path, e))?;
    }
    writer.flush().map_err(|e| ReconError::io(path, e))
}
