use std::path::Path;

use color_eyre::{eyre::eyre, Result};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_ENV: &str = "RECIPEBOOK_LOG";
const DEFAULT_FILTER: &str = "recipebook=info";

/// Log to a daily file under `log_dir`, and surface warnings on stderr.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// life of the program.
pub fn init(log_dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(log_dir, "recipebook.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let file_filter =
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

  tracing_subscriber::registry()
    .with(
      fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(file_filter),
    )
    .with(
      fmt::layer()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .with_filter(stderr_filter()),
    )
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}

/// Warnings for stderr. Stale reads from the cache layer are reported by the
/// command output, so they only go to the file.
fn stderr_filter() -> Targets {
  Targets::new()
    .with_target("recipebook", Level::WARN)
    .with_target("recipebook::cache::layer", LevelFilter::OFF)
}
