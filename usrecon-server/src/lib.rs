//! usrecon-server
//!
//! Newline-delimited JSON transport for `usrecon-core`. Each request line is
//! decoded, run on a blocking worker thread against a shared
//! [`Reconstructor`](usrecon_core::pipeline::Reconstructor), and answered
//! with exactly one reply line.

/// Request decoding and reply encoding
pub mod handler;

/// Subscriber setup for the binaries
pub mod logging;

/// TCP accept loop
pub mod server;
