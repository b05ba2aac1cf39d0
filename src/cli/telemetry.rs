//! Tracing subscriber installation. Called once from `cli::start`.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt::writer::BoxMakeWriter};

/// Install the global subscriber.
///
/// The verbosity flag sets the default directive; `RUST_LOG` can still
/// override per-target. Logs go to stderr unless a file is given.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or a subscriber is
/// already installed.
pub fn init(level: Option<tracing::Level>, json: bool, log_file: Option<&str>) -> Result<()> {
    let level = level.unwrap_or(tracing::Level::ERROR);
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let writer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {path}"))?;
            BoxMakeWriter::new(Arc::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .with_writer(writer);

    if json {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to initialize tracing subscriber")
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to initialize tracing subscriber")
    }
}
