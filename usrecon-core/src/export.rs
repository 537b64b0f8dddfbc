use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ReconError, Result};

/// Writes `image` (values in `[0, 1]`) as an ASCII greyscale PGM.
///
/// Pixels are scaled to 0-255 by truncation; out-of-range values are clamped.
pub fn write_pgm(path: &Path, image: &[f64], width: usize, height: usize) -> Result<()> {
    if image.len() != width * height {
        return Err(ReconError::DimensionMismatch {
            what: "image",
            expected: width * height,
            got: image.len(),
        });
    }

    let file = File::create(path).map_err(|e| ReconError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let io = |e| ReconError::io(path, e);

    write!(writer, "P2\n{width} {height}\n255\n").map_err(io)?;
    for row in image.chunks(width.max(1)) {
        for v in row {
            write!(writer, "{} ", (v.clamp(0.0, 1.0) * 255.0) as u8).map_err(io)?;
        }
        writeln!(writer).map_err(io)?;
    }
    writer.flush().map_err(io)
}

/// Summary of one reconstruction, written next to the images.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconstructionMetadata {
    pub algorithm: String,
    pub problem_id: String,
    pub width: usize,
    pub height: usize,
    /// Unix seconds.
    pub started_at: u64,
    /// Unix seconds.
    pub finished_at: u64,
    pub iterations: usize,
    pub elapsed_seconds: f64,
    pub residual: f64,
    pub memory_mb: f64,
    pub stop_reason: String,
    /// Total milliseconds per pipeline stage.
    pub stage_ms: BTreeMap<String, f64>,
}

impl ReconstructionMetadata {
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| ReconError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush().map_err(|e| ReconError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "usrecon-export-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn pgm_layout() {
        let dir = test_dir("pgm");
        let path = dir.join("img.pgm");
        write_pgm(&path, &[0.0, 0.5, 1.0, 0.999, 2.0, -1.0], 3, 2).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "P2\n3 2\n255\n0 127 255 \n254 255 0 \n");
    }

    #[test]
    fn pgm_rejects_wrong_shape() {
        let dir = test_dir("shape");
        assert!(matches!(
            write_pgm(&dir.join("bad.pgm"), &[0.0; 3], 2, 2),
            Err(ReconError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn metadata_json() {
        let dir = test_dir("meta");
        let path = dir.join("meta.json");
        let meta = ReconstructionMetadata {
            algorithm: "CGNR".to_string(),
            problem_id: "img1".to_string(),
            width: 60,
            height: 60,
            started_at: 10,
            finished_at: 12,
            iterations: 10,
            elapsed_seconds: 1.5,
            residual: 0.25,
            memory_mb: 100.0,
            stop_reason: "max_iterations".to_string(),
            stage_ms: BTreeMap::from([("solve".to_string(), 1500.0)]),
        };
        meta.write_json(&path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["problem_id"], "img1");
        assert_eq!(value["iterations"], 10);
        assert_eq!(value["stage_ms"]["solve"], 1500.0);
    }
}
