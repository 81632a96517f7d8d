//! Tracing setup for the `prism` binary.
//!
//! Everything passing the `EnvFilter` goes to a daily rolling file under the
//! logs directory. Stderr only shows warnings unless `--verbose` is given.

use prism_infrastructure::paths::PrismPaths;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "info,prism=debug";
const LOG_FILE_PREFIX: &str = "prism.log";

/// Installs the global subscriber. Keep the returned guard alive until exit
/// so buffered file output gets flushed.
pub fn init(verbose: bool) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stderr_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let stderr_layer = fmt::layer()
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(stderr_level);

    let (file_layer, guard) = match file_writer() {
        Some((writer, guard)) => {
            let layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    tracing::debug!("Tracing initialized");
    guard
}

fn file_writer() -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = PrismPaths::logs_dir().ok()?;
    if let Err(e) = std::fs::create_dir_all(&dir) {
        eprintln!("Cannot create log directory {}: {}", dir.display(), e);
        return None;
    }
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    Some(tracing_appender::non_blocking(appender))
}
