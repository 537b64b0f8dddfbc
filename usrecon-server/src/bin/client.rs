/*
This program sends a batch of reconstruction requests to a running server, all at once, and
prints a report.
*/

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use futures::future::join_all;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use usrecon_server::handler::{IncomingMessage, OutgoingMessage};

/// Program to submit concurrent reconstruction requests.
///
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON file holding an array of request objects
    requests: PathBuf,

    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:5000")]
    addr: String,
}

async fn send(
    addr: &str,
    request: &IncomingMessage,
) -> Result<OutgoingMessage, Box<dyn std::error::Error>> {
    let stream = TcpStream::connect(addr).await?;
    let (read, mut write) = stream.into_split();
    let mut line = serde_json::to_vec(request)?;
    line.push(b'\n');
    write.write_all(&line).await?;
    write.shutdown().await?;

    let reply = BufReader::new(read)
        .lines()
        .next_line()
        .await?
        .ok_or("connection closed without a reply")?;
    Ok(serde_json::from_str(&reply)?)
}

fn print_failure(problem_id: &str, status: &str, wall: f64, message: &str) {
    println!(
        "{:<16} {:<8} {:>6} {:>12} {:>10} {:>10.3}  {}",
        problem_id, status, "-", "-", "-", wall, message
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let text = tokio::fs::read_to_string(&args.requests).await?;
    let requests: Vec<IncomingMessage> = serde_json::from_str(&text)?;

    println!("[Client] Sending {} requests to {}", requests.len(), args.addr);
    let start = Instant::now();

    let addr = args.addr.as_str();
    let replies = join_all(requests.iter().map(|request| async move {
        let sent = Instant::now();
        let reply = send(addr, request).await;
        (request, reply, sent.elapsed())
    }))
    .await;

    let mut succeeded = 0;
    println!(
        "{:<16} {:<8} {:>6} {:>12} {:>10} {:>10}  stop / message",
        "problem", "status", "iters", "residual", "memory_mb", "wall_s"
    );
    for (request, reply, wall) in &replies {
        let wall = wall.as_secs_f64();
        match reply {
            Ok(OutgoingMessage::Success {
                iterations,
                residual,
                memory_mb,
                stop_reason,
                ..
            }) => {
                succeeded += 1;
                println!(
                    "{:<16} {:<8} {:>6} {:>12.4e} {:>10.1} {:>10.3}  {}",
                    request.problem_id, "ok", iterations, residual, memory_mb, wall, stop_reason
                );
            }
            Ok(OutgoingMessage::Error { message }) => {
                print_failure(&request.problem_id, "error", wall, message);
            }
            Err(e) => {
                print_failure(&request.problem_id, "failed", wall, &e.to_string());
            }
        }
    }

    println!(
        "[Client] {}/{} succeeded in {:?}",
        succeeded,
        replies.len(),
        start.elapsed()
    );
    Ok(())
}
