use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ReconError, Result};
use crate::kernel::{axpy_in_place, norm_sq, xpby_in_place};
use crate::operator::DenseOperator;

/// Squared response norm below which a search direction is considered dead.
pub const STABILITY_THRESHOLD: f64 = 1e-20;

/// Why an iterative solve terminated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Ran the full iteration budget.
    MaxIterations,
    /// The search direction produced a near-zero response (`|Hp|² < 1e-20`).
    Stability,
    /// The stopping rule of the solver was met.
    Convergence,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::MaxIterations => write!(f, "max_iterations"),
            StopReason::Stability => write!(f, "stability"),
            StopReason::Convergence => write!(f, "convergence"),
        }
    }
}

/// Output of one solve. Immutable once built.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Reconstruction {
    /// Solution `f`, one value per image pixel.
    pub image: Vec<f64>,
    /// Iterations started, including one that ended in a stability stop.
    pub iterations: usize,
    pub elapsed_seconds: f64,
    /// Last recorded squared residual norm `r·r` (0 if none was recorded).
    pub residual: f64,
    pub stop: StopReason,
}

/// Which iterative method a request runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    #[default]
    Cgnr,
    Cgls,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Cgnr => write!(f, "CGNR"),
            Algorithm::Cgls => write!(f, "CGLS (regularized)"),
        }
    }
}

/// Conjugate Gradient on the normal-residual equations `HᵗH f = Hᵗg`.
///
/// `HᵗH` is never formed; each iteration costs one product with `H` and one
/// with `Hᵗ`. Convergence is judged on the change of `r·r` between two
/// iterations, not on its magnitude, so a residual that stalls far from zero
/// also counts as converged. `tol` is absolute.
///
/// # Example
///
/// ```rust
/// # use usrecon_core::operator::DenseOperator;
/// # use usrecon_core::solver::CgnrSolver;
///
/// let data = [1.0, 0.0, 0.0, 1.0];
/// let h = DenseOperator::new(&data, 2, 2).unwrap();
/// let result = CgnrSolver::default().solve(&h, &[3.0, 4.0]).unwrap();
/// assert!((result.image[0] - 3.0).abs() < 1e-12);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CgnrSolver {
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for CgnrSolver {
    fn default() -> Self {
        CgnrSolver {
            max_iter: 10,
            tol: 1e-4,
        }
    }
}

impl CgnrSolver {
    pub fn new(max_iter: usize, tol: f64) -> Self {
        CgnrSolver { max_iter, tol }
    }

    pub fn solve(&self, h: &DenseOperator<'_>, g: &[f64]) -> Result<Reconstruction> {
        check_signal(h, g)?;
        let start = Instant::now();

        let mut f = vec![0.0; h.cols()];
        let mut r = g.to_vec();
        let mut z = h.apply_transpose(&r);
        let mut p = z.clone();

        let mut rr_old = norm_sq(&r);
        let mut zz_old = norm_sq(&z);
        let mut residual = 0.0;
        let mut iterations = 0;
        let mut stop = StopReason::MaxIterations;

        for i in 0..self.max_iter {
            iterations += 1;

            let w = h.apply(&p);
            let ww = norm_sq(&w);
            if ww < STABILITY_THRESHOLD {
                stop = StopReason::Stability;
                break;
            }

            let alpha = zz_old / ww;
            axpy_in_place(&mut f, alpha, &p);
            axpy_in_place(&mut r, -alpha, &w);

            let rr_new = norm_sq(&r);
            let epsilon = (rr_new - rr_old).abs();
            residual = rr_new;
            debug!(iteration = i, residual, epsilon, "cgnr step");

            if epsilon < self.tol && i > 0 {
                stop = StopReason::Convergence;
                break;
            }

            z = h.apply_transpose(&r);
            let zz_new = norm_sq(&z);
            let beta = zz_new / zz_old;
            xpby_in_place(&mut p, &z, beta);
            zz_old = zz_new;
            rr_old = rr_new;
        }

        let elapsed_seconds = start.elapsed().as_secs_f64();
        info!(iterations, residual, %stop, elapsed_seconds, "cgnr finished");
        Ok(Reconstruction {
            image: f,
            iterations,
            elapsed_seconds,
            residual,
            stop,
        })
    }
}

/// Tikhonov-regularized CGLS: minimizes `||Hf - g||² + λ²||f||²`.
///
/// Stops when the relative update `||αp|| / ||f||` drops below `tol`, or when
/// the step denominator vanishes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CglsSolver {
    pub max_iter: usize,
    pub tol: f64,
    pub lambda: f64,
}

impl CglsSolver {
    pub fn new(max_iter: usize, tol: f64, lambda: f64) -> Self {
        CglsSolver {
            max_iter,
            tol,
            lambda,
        }
    }

    /// `0.1 * max|Hᵗg|`, the regularization weight used when a request does
    /// not pick one.
    pub fn auto_lambda(h: &DenseOperator<'_>, g: &[f64]) -> f64 {
        h.apply_transpose(g)
            .iter()
            .fold(0.0_f64, |acc, v| acc.max(v.abs()))
            * 0.10
    }

    pub fn solve(&self, h: &DenseOperator<'_>, g: &[f64]) -> Result<Reconstruction> {
        check_signal(h, g)?;
        let start = Instant::now();
        let lambda = self.lambda;

        let mut f = vec![0.0; h.cols()];
        let mut r = g.to_vec();
        let mut s = h.apply_transpose(&r);
        let mut p = s.clone();
        let mut gamma = norm_sq(&s);

        let mut iterations = 0;
        let mut stop = StopReason::MaxIterations;

        for i in 0..self.max_iter {
            iterations += 1;

            let q = h.apply(&p);
            let delta = norm_sq(&q) + lambda * lambda * norm_sq(&p);
            if delta == 0.0 {
                stop = StopReason::Stability;
                break;
            }

            let alpha = gamma / delta;
            axpy_in_place(&mut f, alpha, &p);
            axpy_in_place(&mut r, -alpha, &q);

            s = h.apply_transpose(&r);
            axpy_in_place(&mut s, -lambda * lambda, &f);
            let gamma_new = norm_sq(&s);

            let f_norm = norm_sq(&f).sqrt();
            if f_norm > 0.0 {
                let change = alpha.abs() * norm_sq(&p).sqrt() / f_norm;
                debug!(iteration = i, change, "cgls step");
                if change < self.tol {
                    stop = StopReason::Convergence;
                    break;
                }
            }

            let beta = gamma_new / gamma;
            xpby_in_place(&mut p, &s, beta);
            gamma = gamma_new;
        }

        let residual = norm_sq(&r);
        let elapsed_seconds = start.elapsed().as_secs_f64();
        info!(iterations, residual, lambda, %stop, elapsed_seconds, "cgls finished");
        Ok(Reconstruction {
            image: f,
            iterations,
            elapsed_seconds,
            residual,
            stop,
        })
    }
}

fn check_signal(h: &DenseOperator<'_>, g: &[f64]) -> Result<()> {
    if g.len() != h.rows() {
        return Err(ReconError::DimensionMismatch {
            what: "g",
            expected: h.rows(),
            got: g.len(),
        });
    }
    Ok(())
}
