use std::path::PathBuf;

use thiserror::Error;

/// Error type for reconstruction requests.
///
/// Every failure is local to one request and reported to the caller. Solver
/// stop states are not errors; see [`crate::solver::StopReason`].
///
/// # Example
///
/// ```rust
/// # use usrecon_core::error::ReconError;
///
/// let err = ReconError::DimensionMismatch { what: "H", expected: 4, got: 3 };
/// assert_eq!(err.to_string(), "H has 3 elements, expected 4");
/// ```
#[derive(Error, Debug)]
pub enum ReconError {
    #[error("{what} has {got} elements, expected {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("no values loaded from {}", path.display())]
    EmptyInput { path: PathBuf },
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),
    #[error("invalid problem id {0:?}: must be a plain file name")]
    InvalidProblemId(String),
    #[error("request needs {requested} bytes but the memory budget is {limit} bytes")]
    ExceedsBudget { requested: u64, limit: u64 },
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cache decode error: {0}")]
    CacheDecode(#[from] bincode::error::DecodeError),
    #[error("cache encode error: {0}")]
    CacheEncode(#[from] bincode::error::EncodeError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReconError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReconError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconError>;
