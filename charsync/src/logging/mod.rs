//! Logging setup.
//!
//! Console output plus an optional daily-rotated log file, both stamped in local time.

use std::path::PathBuf;

use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "charsync=info,reqwest=warn";

/// Log file prefix; the appender adds the date suffix.
const LOG_FILE_PREFIX: &str = "charsync.log";

/// Custom timer that uses the local timezone via chrono.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Initialize logging.
///
/// `RUST_LOG` overrides [`DEFAULT_LOG_FILTER`].
///
/// # Arguments
/// * `log_dir` - Directory for rotated log files; `None` logs to the console only
///
/// # Returns
/// The file writer guard, if file logging is enabled. Keep it alive for the app lifetime.
pub fn init_logging(log_dir: Option<&str>) -> crate::Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let log_path = PathBuf::from(dir);
            std::fs::create_dir_all(&log_path)?;

            let file_appender = tracing_appender::rolling::daily(&log_path, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(file_layer)
        .try_init()
        .map_err(|e| crate::Error::Other(format!("Failed to set global default subscriber: {}", e)))?;

    Ok(guard)
}
