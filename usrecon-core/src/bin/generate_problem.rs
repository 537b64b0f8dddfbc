/*
This program generates a synthetic reconstruction problem and stores H and g as CSV files.
*/

extern crate nalgebra as na;

use std::error::Error;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use rand::prelude::*;
use rand_distr::{Normal, StandardNormal};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use usrecon_core::{loader::write_csv, pipeline::ReconstructRequest, solver::Algorithm};

/// Program to generate a model matrix H and signal g with known point sources.
///
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The number of depth samples (row groups of H)
    #[arg(short, long)]
    s: usize,

    /// The number of entries per depth sample
    #[arg(short, long)]
    n: usize,

    /// Image width in pixels
    #[arg(long, default_value_t = 60)]
    width: usize,

    /// Image height in pixels
    #[arg(long, default_value_t = 60)]
    height: usize,

    /// The number of point sources in f_true
    #[arg(short, long, default_value_t = 5)]
    k: usize,

    /// Standard deviation of the additive noise
    #[arg(long, default_value_t = 0.01)]
    noise: f64,

    /// RNG seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// The number of threads to use for parallelization
    #[arg(short, long, default_value_t = 1)]
    threads: usize,

    /// The prefix for the output files
    #[arg(short, long, default_value_t = ("problem").to_string())]
    prefix: String,

    /// Output directory
    #[arg(short, long, default_value = "data")]
    output: PathBuf,
}

fn normalized_column(rows: usize, seed: u64) -> Vec<f64> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut column: Vec<f64> = (0..rows).map(|_| rng.sample(StandardNormal)).collect();
    let norm = column.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        column.iter_mut().for_each(|x| *x /= norm);
    }
    column
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let rows = args.s.checked_mul(args.n).ok_or("s * n overflows")?;
    let cols = args.width.checked_mul(args.height).ok_or("width * height overflows")?;
    if rows == 0 || cols == 0 {
        return Err("all dimensions must be positive".into());
    }
    if args.k > cols {
        return Err(format!("cannot place {} sources in {} pixels", args.k, cols).into());
    }
    #[cfg(feature = "rayon")]
    let threads = args.threads;
    #[cfg(not(feature = "rayon"))]
    let _ = args.threads;

    let start = Instant::now();
    let mut h = na::DMatrix::<f64>::zeros(rows, cols);

    println!("[Main] Generating H ({rows} x {cols})...");
    let h_start = Instant::now();

    #[cfg(feature = "rayon")]
    {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
        let columns: Vec<Vec<f64>> = pool.install(|| {
            (0..cols)
                .into_par_iter()
                .map(|j| normalized_column(rows, args.seed + 1 + j as u64))
                .collect()
        });
        for (j, column) in columns.into_iter().enumerate() {
            h.column_mut(j).copy_from_slice(&column);
        }
    }

    #[cfg(not(feature = "rayon"))]
    for j in 0..cols {
        let column = normalized_column(rows, args.seed + 1 + j as u64);
        h.column_mut(j).copy_from_slice(&column);
    }

    println!("[Main] H generated in {:?}", h_start.elapsed());

    let mut rng = SmallRng::seed_from_u64(args.seed);
    let mut f_true = na::DVector::<f64>::zeros(cols);
    for idx in rand::seq::index::sample(&mut rng, cols, args.k) {
        f_true[idx] = rng.random_range(0.5..1.0);
    }

    let noise = Normal::new(0.0, args.noise)?;
    let v = na::DVector::<f64>::from_iterator(rows, (0..rows).map(|_| rng.sample(noise)));
    let g = &h * &f_true + v;
    println!("[Main] g = H f_true + v computed");

    std::fs::create_dir_all(&args.output)?;
    let h_path = args.output.join(format!("{}-H.csv", args.prefix));
    let g_path = args.output.join(format!("{}-g.csv", args.prefix));
    let f_path = args.output.join(format!("{}-f.csv", args.prefix));

    // H is stored row-major, one matrix row per line.
    let h_rows = h.transpose();
    write_csv(&h_path, h_rows.as_slice(), cols)?;
    write_csv(&g_path, g.as_slice(), 1)?;
    write_csv(&f_path, f_true.as_slice(), args.width)?;

    println!("[Main] Data generation complete in {:?}", start.elapsed());

    let request = ReconstructRequest {
        problem_id: args.prefix.clone(),
        h_path,
        g_path,
        width: args.width,
        height: args.height,
        s: args.s,
        n: args.n,
        max_iter: None,
        tol: None,
        algorithm: Algorithm::Cgnr,
        lambda: None,
    };
    println!("{}", serde_json::to_string(&request)?);
    Ok(())
}
