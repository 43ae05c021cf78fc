//! Structured logging with tracing.
//!
//! Output goes to a log file so the terminal stays free for command output.
//! `TRACKR_LOG` takes precedence over the configured level.

use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Handle for the installed subscriber.
///
/// Holds the non-blocking writer's guard; buffered lines are flushed when the
/// last clone is dropped.
#[derive(Clone)]
pub struct Logger {
  level: LevelFilter,
  _guard: Option<Arc<WorkerGuard>>,
}

impl Logger {
  pub fn level(&self) -> LevelFilter {
    self.level
  }
}

impl std::fmt::Debug for Logger {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Logger").field("level", &self.level).finish()
  }
}

/// Parse a level name or a numeric verbosity (0 = error .. 4 = trace).
pub fn parse_level(level: &str) -> Result<LevelFilter> {
  match level.trim().to_lowercase().as_str() {
    "off" => Ok(LevelFilter::OFF),
    "0" | "error" => Ok(LevelFilter::ERROR),
    "1" | "warn" | "warning" => Ok(LevelFilter::WARN),
    "2" | "info" => Ok(LevelFilter::INFO),
    "3" | "debug" => Ok(LevelFilter::DEBUG),
    "4" | "trace" => Ok(LevelFilter::TRACE),
    other => Err(eyre!(
      "Invalid log level '{}'. Use error, warn, info, debug, trace or 0-4",
      other
    )),
  }
}

/// Install the global subscriber, logging to `trackr.log` in `log_dir`, or to
/// stderr when no directory is given. A second install is a no-op.
pub fn init(level: LevelFilter, log_dir: Option<&Path>) -> Result<Logger> {
  let filter = EnvFilter::builder()
    .with_default_directive(level.into())
    .with_env_var("TRACKR_LOG")
    .from_env_lossy();

  let (writer, guard) = match log_dir {
    Some(dir) => {
      std::fs::create_dir_all(dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;
      let appender = tracing_appender::rolling::never(dir, "trackr.log");
      let (non_blocking, guard) = tracing_appender::non_blocking(appender);
      (BoxMakeWriter::new(non_blocking), Some(Arc::new(guard)))
    }
    None => (BoxMakeWriter::new(std::io::stderr), None),
  };

  let installed = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .with_target(true)
    .try_init();

  match installed {
    Ok(()) => info!(%level, "logging initialized"),
    Err(_) => debug!("subscriber already installed"),
  }

  Ok(Logger {
    level,
    _guard: guard,
  })
}
