use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};
use usrecon_core::{
    error::ReconError,
    pipeline::{ReconstructOutcome, ReconstructRequest, Reconstructor},
    solver::StopReason,
};

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("invalid request: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Recon(#[from] ReconError),
    #[error("worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// One request line, as sent by clients.
pub type IncomingMessage = ReconstructRequest;

/// One reply line. Serialized with a `status` tag of `success` or `error`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum OutgoingMessage {
    Success {
        problem_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_path: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw_image_path: Option<PathBuf>,
        iterations: usize,
        elapsed_seconds: f64,
        residual: f64,
        memory_mb: f64,
        stop_reason: StopReason,
    },
    Error {
        message: String,
    },
}

impl OutgoingMessage {
    fn from_outcome(problem_id: String, outcome: ReconstructOutcome) -> Self {
        let (image_path, raw_image_path) = match outcome.outputs {
            Some(files) => (Some(files.image), Some(files.raw_image)),
            None => (None, None),
        };
        OutgoingMessage::Success {
            problem_id,
            image_path,
            raw_image_path,
            iterations: outcome.reconstruction.iterations,
            elapsed_seconds: outcome.reconstruction.elapsed_seconds,
            residual: outcome.reconstruction.residual,
            memory_mb: outcome.memory_mb,
            stop_reason: outcome.reconstruction.stop,
        }
    }
}

/// Decodes a request line, rejecting malformed JSON, zero dimensions and
/// problem ids that are not plain file names.
pub fn decode(line: &str) -> Result<IncomingMessage, HandlerError> {
    let request: IncomingMessage = serde_json::from_str(line)?;
    request.validate()?;
    Ok(request)
}

/// Runs one request on a blocking worker thread. The memory budget may park
/// that thread; the async runtime is never blocked.
pub async fn function_handler(
    request: IncomingMessage,
    reconstructor: Arc<Reconstructor>,
) -> Result<OutgoingMessage, HandlerError> {
    info!(
        problem_id = %request.problem_id,
        algorithm = %request.algorithm,
        width = request.width,
        height = request.height,
        "request received"
    );
    let problem_id = request.problem_id.clone();
    let outcome =
        tokio::task::spawn_blocking(move || reconstructor.reconstruct(&request)).await??;
    Ok(OutgoingMessage::from_outcome(problem_id, outcome))
}

/// Produces the reply for one request line. Never fails: every error becomes
/// an error reply.
pub async fn handle_line(line: &str, reconstructor: Arc<Reconstructor>) -> OutgoingMessage {
    let result = match decode(line) {
        Ok(request) => function_handler(request, reconstructor).await,
        Err(e) => Err(e),
    };
    result.unwrap_or_else(|e| {
        error!(error = %e, "request failed");
        OutgoingMessage::Error {
            message: e.to_string(),
        }
    })
}
