//! Tracing configuration for the soundboard
//!
//! Dual output to stderr (colored) and file (plain), with non-blocking
//! daily-rotated file writes.

use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::Mutex;

use tracing::level_filters::LevelFilter;
use tracing_appender::{
    non_blocking::{NonBlockingBuilder, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::utils::lock_or_recover;

/// Global guard to keep the non-blocking writer alive
static WORKER_GUARD: OnceCell<Mutex<Option<WorkerGuard>>> = OnceCell::new();

const LOG_FILE_PREFIX: &str = "soundboard";
const MAX_LOG_FILES: usize = 7;

/// Initialize the tracing subscriber with dual output:
/// - Stderr: Colored, respects RUST_LOG env var
/// - File: Plain text, daily rotation, 7 files retained, non-blocking
///
/// `verbose` lowers both defaults to debug. The worker guard is stored
/// globally.
pub fn init_tracing(log_dir: &Path, verbose: bool) -> anyhow::Result<()> {
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(log_dir)?;

    let (non_blocking_writer, guard) = NonBlockingBuilder::default()
        .lossy(false) // Don't drop logs under pressure
        .finish(file_appender);

    WORKER_GUARD.get_or_init(|| Mutex::new(Some(guard)));

    let default_level = if verbose { "debug" } else { "info" };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let console_layer = fmt::layer()
        .with_ansi(true)
        .with_target(true)
        .with_level(true)
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let file_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_writer(non_blocking_writer)
        .with_filter(file_level);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!("Tracing initialized, log dir: {}", log_dir.display());

    Ok(())
}

/// Flush and drop the file writer. Events logged afterwards only reach the
/// console.
pub fn shutdown_tracing() {
    if let Some(guard) = WORKER_GUARD.get() {
        lock_or_recover(guard).take();
    }
}
