//! usrecon-core
//!
//! This library provides the core of the ultrasound reconstruction service:
//! loading the model matrix `H` and signal `g`, depth-gain correction,
//! iterative least-squares solvers, image post-processing, and the memory
//! budget that admits concurrent requests.
//! The transport lives in `usrecon-server`; everything here is synchronous
//! and safe to run on blocking threads.
//!
//! # Functionality
//!
//! - CSV loading with a binary side cache
//! - Dense matrix-vector kernels and a borrowed operator view
//! - CGNR and regularized CGLS solvers
//! - Normalization, noise thresholding and non-maximum suppression
//! - PGM and JSON export
//! - Per-stage timing and logging
//!
//! # Features
//!
//! - `rayon` - Parallelize the matrix-vector kernels and problem generation
//!

/// Memory admission control
pub mod budget;

/// Service and solver configuration
pub mod config;

/// Error type
pub mod error;

/// Image and metadata output
pub mod export;

/// Depth-dependent signal gain
pub mod gain;

/// Dense vector and matrix-vector kernels
pub mod kernel;

/// CSV and binary cache loading
pub mod loader;

/// Borrowed dense operator
pub mod operator;

/// Request orchestration
pub mod pipeline;

/// Image post-processing
pub mod postprocess;

/// Iterative solvers
pub mod solver;

/// Timing and logging utilities
pub mod timing;
