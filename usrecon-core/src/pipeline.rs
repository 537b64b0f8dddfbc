use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    budget::MemoryBudget,
    config::{OutputConfig, ReconConfig},
    error::{ReconError, Result},
    export::{ReconstructionMetadata, write_pgm},
    gain::apply_depth_gain,
    loader::load_vector,
    operator::DenseOperator,
    postprocess::PostProcessor,
    solver::{Algorithm, CglsSolver, CgnrSolver, Reconstruction},
    timing::{TimingTracker, time_stage, unix_now},
};

const MIB: f64 = 1024.0 * 1024.0;

/// One reconstruction command.
///
/// `h_path` and `g_path` name CSV files (or their `.bin` caches). `H` must
/// hold `s * n * width * height` values and `g` must hold `s * n`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconstructRequest {
    pub problem_id: String,
    pub h_path: PathBuf,
    pub g_path: PathBuf,
    pub width: usize,
    pub height: usize,
    /// Number of row groups (depth samples)
    pub s: usize,
    /// Entries per row group
    pub n: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iter: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tol: Option<f64>,
    #[serde(default)]
    pub algorithm: Algorithm,
    /// Regularization weight for CGLS; derived from the data when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lambda: Option<f64>,
}

impl ReconstructRequest {
    /// Checks the id and dimensions, returning `(rows, cols)` of `H`.
    ///
    /// The id becomes part of output file names, so it must be a single
    /// non-empty path component.
    pub fn validate(&self) -> Result<(usize, usize)> {
        let id = self.problem_id.as_str();
        if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\', '\0']) {
            return Err(ReconError::InvalidProblemId(self.problem_id.clone()));
        }
        self.dimensions()
    }

    /// `(rows, cols)` of `H`, i.e. `(s * n, width * height)`.
    pub fn dimensions(&self) -> Result<(usize, usize)> {
        let dims = [self.s, self.n, self.width, self.height];
        if dims.contains(&0) {
            return Err(ReconError::InvalidDimensions(format!(
                "s={}, n={}, width={}, height={} must all be positive",
                self.s, self.n, self.width, self.height
            )));
        }
        let overflow = || ReconError::InvalidDimensions("problem size overflows".to_string());
        let rows = self.s.checked_mul(self.n).ok_or_else(overflow)?;
        let cols = self.width.checked_mul(self.height).ok_or_else(overflow)?;
        rows.checked_mul(cols).ok_or_else(overflow)?;
        Ok((rows, cols))
    }
}

/// Files written for one request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputFiles {
    pub image: PathBuf,
    pub raw_image: PathBuf,
    pub metadata: PathBuf,
    pub timings: PathBuf,
}

/// Everything a successful request produces.
#[derive(Debug)]
pub struct ReconstructOutcome {
    pub algorithm: Algorithm,
    pub reconstruction: Reconstruction,
    /// Normalized solution
    pub raw_image: Vec<f64>,
    /// Normalized, thresholded and suppressed solution
    pub clean_image: Vec<f64>,
    /// Size of the memory reservation the request ran under, in MiB
    pub memory_mb: f64,
    pub outputs: Option<OutputFiles>,
    pub timings: TimingTracker,
}

/// Runs reconstruction requests against a shared [`MemoryBudget`].
///
/// A request first reserves the estimated size of its operator, then loads
/// `H` and `g`, applies the depth gain, solves, and post-processes. The
/// reservation is held for the whole request and released on every exit
/// path, including errors.
///
/// `Reconstructor` is `Sync`; one instance serves all concurrent requests,
/// each on its own thread.
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use usrecon_core::budget::MemoryBudget;
/// # use usrecon_core::config::ReconConfig;
/// # use usrecon_core::pipeline::{Reconstructor, ReconstructRequest};
/// # fn example(request: ReconstructRequest) -> Result<(), Box<dyn std::error::Error>> {
/// let budget = Arc::new(MemoryBudget::default());
/// let reconstructor = Reconstructor::new(budget, ReconConfig::default());
/// let outcome = reconstructor.reconstruct(&request)?;
/// println!("{} iterations", outcome.reconstruction.iterations);
/// # Ok(())
/// # }
/// ```
pub struct Reconstructor {
    budget: Arc<MemoryBudget>,
    config: ReconConfig,
}

impl Reconstructor {
    pub fn new(budget: Arc<MemoryBudget>, config: ReconConfig) -> Self {
        Reconstructor { budget, config }
    }

    pub fn budget(&self) -> &MemoryBudget {
        &self.budget
    }

    pub fn config(&self) -> &ReconConfig {
        &self.config
    }

    /// Bytes reserved for a `rows x cols` operator: its size in doubles
    /// times the configured overhead factor.
    pub fn estimate_bytes(&self, rows: usize, cols: usize) -> u64 {
        let bytes = rows as f64 * cols as f64 * std::mem::size_of::<f64>() as f64;
        (bytes * self.config.overhead_factor) as u64
    }

    #[tracing::instrument(skip(self, request), fields(problem_id = %request.problem_id))]
    pub fn reconstruct(&self, request: &ReconstructRequest) -> Result<ReconstructOutcome> {
        let (rows, cols) = request.validate()?;
        let requested = self.estimate_bytes(rows, cols);
        if requested > self.budget.limit() {
            return Err(ReconError::ExceedsBudget {
                requested,
                limit: self.budget.limit(),
            });
        }

        info!(estimated_mb = requested as f64 / MIB, "waiting for admission");
        let reservation = self.budget.acquire(requested);
        let started_at = unix_now();
        let mut timings = TimingTracker::new();

        let h = time_stage(&mut timings, "load_h", || load_vector(&request.h_path))?;
        let operator = DenseOperator::new(&h, rows, cols)?;
        let mut g = time_stage(&mut timings, "load_g", || load_vector(&request.g_path))?;
        time_stage(&mut timings, "gain", || {
            apply_depth_gain(&mut g, request.s, request.n)
        })?;

        let max_iter = request.max_iter.unwrap_or(self.config.solver.max_iter);
        let tol = request.tol.unwrap_or(self.config.solver.tol);
        let reconstruction = time_stage(&mut timings, "solve", || match request.algorithm {
            Algorithm::Cgnr => CgnrSolver::new(max_iter, tol).solve(&operator, &g),
            Algorithm::Cgls => {
                let lambda = request
                    .lambda
                    .unwrap_or_else(|| CglsSolver::auto_lambda(&operator, &g));
                CglsSolver::new(max_iter, tol, lambda).solve(&operator, &g)
            }
        })?;

        let processor = PostProcessor::new(request.width, request.height)
            .with_percentile(self.config.percentile);
        let (raw_image, clean_image) = time_stage(&mut timings, "postprocess", || {
            Ok::<_, ReconError>((
                processor.raw(&reconstruction.image)?,
                processor.clean(&reconstruction.image)?,
            ))
        })?;

        let memory_mb = reservation.bytes() as f64 / MIB;
        let outputs = match &self.config.output {
            Some(output) => {
                let metadata = ReconstructionMetadata {
                    algorithm: request.algorithm.to_string(),
                    problem_id: request.problem_id.clone(),
                    width: request.width,
                    height: request.height,
                    started_at,
                    finished_at: unix_now(),
                    iterations: reconstruction.iterations,
                    elapsed_seconds: reconstruction.elapsed_seconds,
                    residual: reconstruction.residual,
                    memory_mb,
                    stop_reason: reconstruction.stop.to_string(),
                    stage_ms: timings.stage_totals(),
                };
                let files = time_stage(&mut timings, "export", || {
                    export(output, request, &metadata, &raw_image, &clean_image)
                })?;
                timings.write_stage_timings_to_csv(&files.timings)?;
                Some(files)
            }
            None => None,
        };

        info!(
            iterations = reconstruction.iterations,
            residual = reconstruction.residual,
            stop = %reconstruction.stop,
            "request finished"
        );
        drop(reservation);

        Ok(ReconstructOutcome {
            algorithm: request.algorithm,
            reconstruction,
            raw_image,
            clean_image,
            memory_mb,
            outputs,
            timings,
        })
    }
}

fn export(
    output: &OutputConfig,
    request: &ReconstructRequest,
    metadata: &ReconstructionMetadata,
    raw_image: &[f64],
    clean_image: &[f64],
) -> Result<OutputFiles> {
    let id = &request.problem_id;
    let files = OutputFiles {
        image: output.file(id, ".pgm"),
        raw_image: output.file(id, "_raw.pgm"),
        metadata: output.file(id, ".json"),
        timings: output.file(id, "_timings.csv"),
    };
    std::fs::create_dir_all(&output.root).map_err(|e| ReconError::io(&output.root, e))?;
    write_pgm(&files.image, clean_image, request.width, request.height)?;
    write_pgm(&files.raw_image, raw_image, request.width, request.height)?;
    metadata.write_json(&files.metadata)?;
    Ok(files)
}
