use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use usrecon_core::{
    budget::MemoryBudget,
    config::{OutputConfig, ReconConfig, SolverConfig},
    pipeline::Reconstructor,
};
use usrecon_server::{logging::init_tracing, server::serve};

/// Reconstruction service: newline-delimited JSON requests over TCP.
///
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:5000")]
    bind: String,

    /// Total memory admitted across in-flight requests, in MiB
    #[arg(long, default_value_t = 4096)]
    memory_limit_mb: u64,

    /// Directory for images and metadata
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Prefix for output file names
    #[arg(long, default_value_t = ("rs_out_").to_string())]
    prefix: String,

    /// Do not write images, metadata or timings
    #[arg(long)]
    no_output: bool,

    /// Default iteration budget for requests that do not set one
    #[arg(long, default_value_t = 10)]
    max_iter: usize,

    /// Default tolerance for requests that do not set one
    #[arg(long, default_value_t = 1e-4)]
    tol: f64,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.json_logs)?;

    let mut config = ReconConfig {
        solver: SolverConfig {
            max_iter: args.max_iter,
            tol: args.tol,
        },
        ..ReconConfig::default()
    };
    if !args.no_output {
        config = config.with_output(OutputConfig::new(&args.output_dir, &args.prefix));
    }

    let limit = args
        .memory_limit_mb
        .checked_mul(1024 * 1024)
        .ok_or("memory limit overflows")?;
    info!(
        memory_limit_mb = args.memory_limit_mb,
        output = !args.no_output,
        "starting reconstruction service"
    );
    let reconstructor = Arc::new(Reconstructor::new(Arc::new(MemoryBudget::new(limit)), config));

    let listener = TcpListener::bind(&args.bind).await?;
    serve(listener, reconstructor).await?;
    Ok(())
}
