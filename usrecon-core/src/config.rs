use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::postprocess::NOISE_PERCENTILE;

/// Default iteration budget and tolerance for requests that do not set them.
///
/// # Example
///
/// ```rust
/// # use usrecon_core::config::SolverConfig;
///
/// let config = SolverConfig::default();
/// assert_eq!(config.max_iter, 10);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Upper bound on solver iterations
    pub max_iter: usize,
    /// Absolute tolerance on the change of the squared residual norm
    pub tol: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            max_iter: 10,
            tol: 1e-4,
        }
    }
}

/// Where reconstructed images and metadata are written.
///
/// Files are named `<root>/<prefix><problem_id>...`.
///
/// # Example
///
/// ```rust
/// # use usrecon_core::config::OutputConfig;
/// # use std::path::Path;
///
/// let config = OutputConfig::new(Path::new("/tmp/recon"), "rs_out_");
/// assert_eq!(config.file("img1", ".pgm"), Path::new("/tmp/recon/rs_out_img1.pgm"));
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for output files
    pub root: PathBuf,
    /// Filename prefix
    pub prefix: String,
}

impl OutputConfig {
    pub fn new(root: &Path, prefix: &str) -> Self {
        OutputConfig {
            root: root.to_path_buf(),
            prefix: prefix.to_string(),
        }
    }

    pub fn file(&self, problem_id: &str, suffix: &str) -> PathBuf {
        self.root.join(format!("{}{}{}", self.prefix, problem_id, suffix))
    }
}

/// Configuration shared by every request a [`Reconstructor`] serves.
///
/// [`Reconstructor`]: crate::pipeline::Reconstructor
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconConfig {
    pub solver: SolverConfig,
    /// `None` disables image, metadata and timing files.
    pub output: Option<OutputConfig>,
    /// Multiplier applied to the size of `H` when reserving memory
    pub overhead_factor: f64,
    /// Percentile used by the clean image's noise threshold
    pub percentile: f64,
}

impl Default for ReconConfig {
    fn default() -> Self {
        ReconConfig {
            solver: SolverConfig::default(),
            output: None,
            overhead_factor: 1.1,
            percentile: NOISE_PERCENTILE,
        }
    }
}

impl ReconConfig {
    pub fn with_output(mut self, output: OutputConfig) -> Self {
        self.output = Some(output);
        self
    }
}
