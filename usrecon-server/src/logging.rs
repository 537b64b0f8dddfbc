use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter, Registry};

use thiserror::Error;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_DIRECTIVE: &str = "info";

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("failed to install global tracing subscriber: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
}

/// Installs the process-wide subscriber: `RUST_LOG` filtering, human readable
/// lines by default or one JSON object per event with `json`.
pub fn init_tracing(json: bool) -> Result<(), LoggingError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let layer: Box<dyn Layer<Registry> + Send + Sync> = if json {
        Box::new(tracing_fmt::layer().json().with_ansi(false))
    } else {
        Box::new(tracing_fmt::layer().with_target(true))
    };

    Registry::default().with(layer).with(filter).try_init()?;
    Ok(())
}
